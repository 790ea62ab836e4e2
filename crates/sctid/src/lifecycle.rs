//! Pure transition function for identifier records.
//!
//! ```text
//! AVAILABLE -> RESERVED -> ASSIGNED -> PUBLISHED -> DEPRECATED
//!                 |           |
//!                 +-----------+--> AVAILABLE   (release)
//! ```
//!
//! Requesting the status a record already has is an idempotent no-op.

use crate::IdentifierStatus;
use core::fmt;
use serde::{Deserialize, Serialize};

/// A client-requested lifecycle operation on existing (or importable) ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Reserve,
    Register,
    Publish,
    Deprecate,
    Release,
}

impl Operation {
    pub const ALL: [Self; 5] = [
        Self::Reserve,
        Self::Register,
        Self::Publish,
        Self::Deprecate,
        Self::Release,
    ];

    /// Status a record ends up in when the operation succeeds.
    pub const fn target(self) -> IdentifierStatus {
        match self {
            Self::Reserve => IdentifierStatus::Reserved,
            Self::Register => IdentifierStatus::Assigned,
            Self::Publish => IdentifierStatus::Published,
            Self::Deprecate => IdentifierStatus::Deprecated,
            Self::Release => IdentifierStatus::Available,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Register => "register",
            Self::Publish => "publish",
            Self::Deprecate => "deprecate",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The legal effect of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// No record exists yet; one is created directly in `to`.
    Create { to: IdentifierStatus },
    /// The record moves from `from` to `to`.
    Apply {
        from: IdentifierStatus,
        to: IdentifierStatus,
    },
    /// The record is already in the requested status.
    Unchanged { status: IdentifierStatus },
}

impl Transition {
    pub const fn to(self) -> IdentifierStatus {
        match self {
            Self::Create { to } | Self::Apply { to, .. } => to,
            Self::Unchanged { status } => status,
        }
    }

    /// Whether the sequence leaves the free pool (or was never in it) and
    /// becomes held.
    pub const fn claims_sequence(self) -> bool {
        matches!(
            self,
            Self::Create { .. }
                | Self::Apply {
                    from: IdentifierStatus::Available,
                    ..
                }
        )
    }

    /// Whether the sequence goes back to the free pool.
    pub const fn releases_sequence(self) -> bool {
        matches!(
            self,
            Self::Apply {
                to: IdentifierStatus::Available,
                ..
            }
        )
    }
}

/// Why an operation cannot be applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The operation needs an existing record and there is none.
    Unknown { operation: Operation },
    /// The record's status does not allow the operation.
    Illegal {
        current: IdentifierStatus,
        operation: Operation,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { operation } => {
                write!(f, "cannot {operation} an identifier that was never issued")
            }
            Self::Illegal { current, operation } => {
                write!(f, "cannot {operation} an identifier in status {current}")
            }
        }
    }
}

/// Decides the effect of `operation` on a record currently in `current`
/// (`None` when the identifier has no record).
pub fn transition(
    current: Option<IdentifierStatus>,
    operation: Operation,
) -> Result<Transition, Rejection> {
    use IdentifierStatus::*;
    use Operation::*;

    let target = operation.target();
    let Some(current) = current else {
        return match operation {
            // Import path and pinned reservations materialize new records.
            Register | Reserve => Ok(Transition::Create { to: target }),
            Publish | Deprecate | Release => Err(Rejection::Unknown { operation }),
        };
    };

    if current == target {
        return Ok(Transition::Unchanged { status: current });
    }

    let legal = matches!(
        (current, operation),
        (Available, Reserve | Register)
            | (Reserved, Register | Release)
            | (Assigned, Publish | Release)
            | (Published, Deprecate)
    );

    if legal {
        Ok(Transition::Apply {
            from: current,
            to: target,
        })
    } else {
        Err(Rejection::Illegal { current, operation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IdentifierStatus::*;
    use Operation::*;

    #[test]
    fn allowed_table() {
        let allowed = [
            (Available, Reserve, Reserved),
            (Available, Register, Assigned),
            (Reserved, Register, Assigned),
            (Reserved, Release, Available),
            (Assigned, Publish, Published),
            (Assigned, Release, Available),
            (Published, Deprecate, Deprecated),
        ];
        for (from, op, to) in allowed {
            assert_eq!(
                transition(Some(from), op),
                Ok(Transition::Apply { from, to }),
                "{from} {op}"
            );
        }
    }

    #[test]
    fn same_state_is_a_no_op() {
        for op in Operation::ALL {
            let status = op.target();
            assert_eq!(
                transition(Some(status), op),
                Ok(Transition::Unchanged { status })
            );
        }
    }

    #[test]
    fn everything_else_is_illegal() {
        let mut illegal = 0;
        for current in IdentifierStatus::ALL {
            for op in Operation::ALL {
                match transition(Some(current), op) {
                    Ok(Transition::Apply { .. } | Transition::Unchanged { .. }) => {}
                    Ok(Transition::Create { .. }) => panic!("create from existing record"),
                    Err(rejection) => {
                        assert_eq!(rejection, Rejection::Illegal { current, operation: op });
                        illegal += 1;
                    }
                }
            }
        }
        // 25 pairs, 7 legal moves, 5 no-ops.
        assert_eq!(illegal, 13);
        assert!(transition(Some(Published), Release).is_err());
        assert!(transition(Some(Deprecated), Publish).is_err());
        assert!(transition(Some(Deprecated), Release).is_err());
    }

    #[test]
    fn unknown_ids() {
        assert_eq!(
            transition(None, Register),
            Ok(Transition::Create { to: Assigned })
        );
        assert_eq!(
            transition(None, Reserve),
            Ok(Transition::Create { to: Reserved })
        );
        for op in [Publish, Deprecate, Release] {
            assert_eq!(
                transition(None, op),
                Err(Rejection::Unknown { operation: op })
            );
        }
    }

    #[test]
    fn sequence_effects() {
        assert!(Transition::Create { to: Assigned }.claims_sequence());
        assert!(
            Transition::Apply {
                from: Available,
                to: Reserved
            }
            .claims_sequence()
        );
        assert!(
            !Transition::Apply {
                from: Reserved,
                to: Assigned
            }
            .claims_sequence()
        );
        assert!(
            Transition::Apply {
                from: Assigned,
                to: Available
            }
            .releases_sequence()
        );
        assert!(!Transition::Unchanged { status: Available }.releases_sequence());
    }

    #[test]
    fn rejection_reasons_read_well() {
        let r = Rejection::Illegal {
            current: Published,
            operation: Release,
        };
        assert_eq!(r.to_string(), "cannot release an identifier in status PUBLISHED");
    }
}
