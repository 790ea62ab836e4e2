use crate::{BucketKey, FormatError};
use core::{fmt, time::Duration};
use serde::{Deserialize, Serialize};

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Stable, serializable classification of an [`Error`].
///
/// Clients branch on the kind, never on the human-readable reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthorized,
    BadRequest,
    InvalidFormat,
    NotFound,
    Conflict,
    Exhausted,
    Unavailable,
    Timeout,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Exhausted => "EXHAUSTED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors the allocation and lifecycle engine can produce.
///
/// Validation and authorization errors are never retried. [`Error::Unavailable`]
/// is the only transient variant; the coordinator retries it internally and
/// surfaces it once the retry budget is spent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The authorization gate rejected the credential. Nothing was attempted.
    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Malformed namespace, category, or quantity, an oversized batch, or an
    /// idempotency key replayed with a different payload.
    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    /// The identifier is not a well-formed, checksum-valid SCTID.
    #[error("invalid identifier {id:?}: {source}")]
    InvalidFormat { id: String, source: FormatError },

    /// Lookup or transition target does not exist.
    #[error("identifier {id} not found")]
    NotFound { id: String },

    /// Illegal state transition, concurrent modification, or a store-level
    /// collision while generating.
    #[error("conflict on identifier {id}: {reason}")]
    Conflict { id: String, reason: String },

    /// The bucket's sequence space is fully consumed. Requires operator
    /// intervention and is never retried.
    #[error("sequence space exhausted for bucket {bucket}")]
    Exhausted { bucket: BucketKey },

    /// The durability layer failed, after retries where applicable.
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// The request gave up waiting for its bucket lock. No work was done.
    #[error("timed out after {waited:?} waiting for bucket {bucket}")]
    Timeout { bucket: BucketKey, waited: Duration },
}

impl Error {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn conflict(id: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Conflict {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found(id: impl fmt::Display) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// The offending identifier(s), where the error concerns specific ids.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::InvalidFormat { id, .. } | Self::NotFound { id } | Self::Conflict { id, .. } => {
                vec![id.as_str()]
            }
            _ => Vec::new(),
        }
    }

    /// Only durability failures are worth another attempt.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::unavailable(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::unavailable(format!("serialization error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, Namespace};

    #[test]
    fn kinds_serialize_as_stable_names() {
        let json = serde_json::to_string(&ErrorKind::BadRequest).unwrap();
        assert_eq!(json, "\"BAD_REQUEST\"");
        let kind: ErrorKind = serde_json::from_str("\"EXHAUSTED\"").unwrap();
        assert_eq!(kind, ErrorKind::Exhausted);
        assert_eq!(ErrorKind::Timeout.to_string(), "TIMEOUT");
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(Error::unavailable("disk").is_retryable());
        assert!(!Error::bad_request("nope").is_retryable());
        assert!(!Error::conflict("138875005", "published").is_retryable());
        let bucket = BucketKey::new(Namespace::CORE, Category::Concept);
        assert!(!Error::Exhausted { bucket }.is_retryable());
    }

    #[test]
    fn offending_ids_are_reported() {
        let err = Error::not_found("138875005");
        assert_eq!(err.ids(), vec!["138875005"]);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(Error::unavailable("disk").ids().is_empty());
    }
}
