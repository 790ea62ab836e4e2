use core::fmt;
use serde::{Deserialize, Serialize};

/// Lifecycle position of an identifier record.
///
/// Fresh sequences start at [`IdentifierStatus::Reserved`];
/// [`IdentifierStatus::Available`] only exists for released sequences waiting
/// to be handed out again. [`IdentifierStatus::Published`] and
/// [`IdentifierStatus::Deprecated`] are permanent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierStatus {
    Available,
    Reserved,
    Assigned,
    Published,
    Deprecated,
}

impl IdentifierStatus {
    pub const ALL: [Self; 5] = [
        Self::Available,
        Self::Reserved,
        Self::Assigned,
        Self::Published,
        Self::Deprecated,
    ];

    /// Whether a record in this status keeps its sequence out of the free
    /// pool.
    pub const fn is_held(self) -> bool {
        !matches!(self, Self::Available)
    }

    /// Published and deprecated identifiers are never recycled.
    pub const fn is_permanent(self) -> bool {
        matches!(self, Self::Published | Self::Deprecated)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Assigned => "ASSIGNED",
            Self::Published => "PUBLISHED",
            Self::Deprecated => "DEPRECATED",
        }
    }
}

impl fmt::Display for IdentifierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which records a store listing should return.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Any,
    Only(IdentifierStatus),
    Held,
}

impl StatusFilter {
    pub const fn matches(self, status: IdentifierStatus) -> bool {
        match self {
            Self::Any => true,
            Self::Only(wanted) => wanted as u8 == status as u8,
            Self::Held => status.is_held(),
        }
    }
}
