//! Front-end errors.
//!
//! [`ServiceError`] wraps engine errors and adds the failures that only exist
//! at the transport: malformed envelopes, oversized lines, closed worker
//! channels, and requests arriving during shutdown. Every variant maps onto a
//! stable [`ErrorKind`] for the wire.

use sctid::ErrorKind;

pub type Result<T> = core::result::Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Error reported by the engine.
    #[error(transparent)]
    Engine(#[from] sctid::Error),

    /// The line was not a valid request envelope.
    #[error("malformed request: {reason}")]
    Protocol { reason: String },

    /// The line exceeded the configured maximum length.
    #[error("request line exceeds {max} bytes")]
    LineTooLong { max: usize },

    /// Internal channel send/receive failure.
    #[error("channel error: {context}")]
    ChannelError { context: String },

    /// The blocking task running a request panicked or was cancelled.
    #[error("worker failed: {reason}")]
    Worker { reason: String },

    /// The service is in the process of shutting down.
    #[error("service is shutting down")]
    ServiceShutdown,
}

impl ServiceError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Engine(e) => e.kind(),
            Self::Protocol { .. } | Self::LineTooLong { .. } => ErrorKind::BadRequest,
            Self::ChannelError { .. } | Self::Worker { .. } | Self::ServiceShutdown => {
                ErrorKind::Unavailable
            }
        }
    }

    pub fn ids(&self) -> Vec<String> {
        match self {
            Self::Engine(e) => e.ids().into_iter().map(str::to_owned).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(err.to_string())
    }
}
