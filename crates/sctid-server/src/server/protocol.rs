//! Newline-delimited JSON envelope.
//!
//! A request is one JSON object per line:
//!
//! ```text
//! {"credential":"s3cret","op":"generate","namespace":1000154,"category":"CONCEPT","quantity":2,"idempotencyKey":"k1"}
//! {"credential":"s3cret","op":"register","ids":["11000154102"],"comment":"run 7","idempotencyKey":"k2"}
//! {"credential":"s3cret","op":"lookupMany","ids":["11000154102","21000154106"]}
//! ```
//!
//! and every request gets exactly one reply line, either `{"ok":<result>}` or
//! `{"error":{"kind":"CONFLICT","reason":"...","ids":["..."]}}`. The requestor
//! recorded on identifiers is always the principal the credential resolved
//! to, never a client-supplied value.

use crate::server::error::{Result, ServiceError};
use sctid::{
    BatchReport, BucketSnapshot, Category, ErrorKind, Generated, Namespace, Operation, Principal,
    SctIdRecord, TransitionRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed request line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub credential: Option<String>,
    pub command: Command,
}

impl Envelope {
    /// # Errors
    /// [`ServiceError::Protocol`] if the line is not a JSON object naming a
    /// known `op` with a well-formed payload.
    pub fn parse(line: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(line)?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| ServiceError::protocol("request must be a JSON object"))?;
        let credential = match object.remove("credential") {
            None | Some(Value::Null) => None,
            Some(Value::String(token)) => Some(token),
            Some(_) => return Err(ServiceError::protocol("credential must be a string")),
        };
        let command = serde_json::from_value(value)?;
        Ok(Self {
            credential,
            command,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Generate {
        namespace: Namespace,
        category: Category,
        quantity: usize,
        idempotency_key: String,
    },
    Reserve(TransitionPayload),
    Register(TransitionPayload),
    Publish(TransitionPayload),
    Deprecate(TransitionPayload),
    Release(TransitionPayload),
    Lookup {
        id: String,
    },
    LookupMany {
        ids: Vec<String>,
    },
    Bucket {
        namespace: Namespace,
        category: Category,
    },
}

impl Command {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Generate { .. } => "generate",
            Self::Reserve(_) => "reserve",
            Self::Register(_) => "register",
            Self::Publish(_) => "publish",
            Self::Deprecate(_) => "deprecate",
            Self::Release(_) => "release",
            Self::Lookup { .. } => "lookup",
            Self::LookupMany { .. } => "lookupMany",
            Self::Bucket { .. } => "bucket",
        }
    }

    /// Splits a lifecycle command into its operation and payload.
    pub fn into_transition(self) -> core::result::Result<(Operation, TransitionPayload), Self> {
        match self {
            Self::Reserve(p) => Ok((Operation::Reserve, p)),
            Self::Register(p) => Ok((Operation::Register, p)),
            Self::Publish(p) => Ok((Operation::Publish, p)),
            Self::Deprecate(p) => Ok((Operation::Deprecate, p)),
            Self::Release(p) => Ok((Operation::Release, p)),
            other => Err(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPayload {
    pub ids: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub idempotency_key: String,
}

impl TransitionPayload {
    pub fn into_request(self, principal: &Principal) -> TransitionRequest {
        TransitionRequest {
            ids: self.ids,
            requestor_id: principal.to_string(),
            comment: self.comment,
            idempotency_key: self.idempotency_key,
        }
    }
}

/// Successful result of any command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Generated(Generated),
    Batch(BatchReport),
    Record(SctIdRecord),
    Records(Vec<SctIdRecord>),
    Bucket(BucketSnapshot),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorReply {
    pub kind: ErrorKind,
    pub reason: String,
    pub ids: Vec<String>,
}

impl From<ServiceError> for ErrorReply {
    fn from(err: ServiceError) -> Self {
        Self {
            kind: err.kind(),
            ids: err.ids(),
            reason: err.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Reply {
    Ok(Payload),
    Error(ErrorReply),
}

// Hand-written so the fallback can never fail to encode.
const ENCODE_FAILURE: &str =
    r#"{"error":{"kind":"UNAVAILABLE","reason":"failed to encode reply","ids":[]}}"#;

impl Reply {
    pub fn error(err: impl Into<ServiceError>) -> Self {
        Self::Error(ErrorReply::from(err.into()))
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to encode reply");
            ENCODE_FAILURE.to_owned()
        })
    }
}

impl From<Result<Payload>> for Reply {
    fn from(result: Result<Payload>) -> Self {
        match result {
            Ok(payload) => Self::Ok(payload),
            Err(err) => Self::error(err),
        }
    }
}
