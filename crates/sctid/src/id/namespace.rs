use crate::FormatError;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Issuing organization of an identifier.
///
/// `0` is the core (international) release; extensions use a seven-digit
/// namespace in `1000000..=9999999`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Namespace(u32);

impl Namespace {
    pub const CORE: Self = Self(0);
    pub const MIN_EXTENSION: u32 = 1_000_000;
    pub const MAX_EXTENSION: u32 = 9_999_999;
    /// Digits a namespace occupies inside a long-form identifier.
    pub const WIDTH: usize = 7;

    pub fn new(namespace: u64) -> Result<Self, FormatError> {
        match u32::try_from(namespace) {
            Ok(0) => Ok(Self::CORE),
            Ok(n) if (Self::MIN_EXTENSION..=Self::MAX_EXTENSION).contains(&n) => Ok(Self(n)),
            _ => Err(FormatError::InvalidNamespace { namespace }),
        }
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn is_core(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u64> for Namespace {
    type Error = FormatError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for u64 {
    fn from(ns: Namespace) -> Self {
        u64::from(ns.0)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
