//! Transport-agnostic request and response contracts.

use crate::{
    BucketKey, Category, ErrorKind, IdentifierStatus, Namespace, Operation, RecyclePolicy,
    SctIdRecord,
};
use serde::{Deserialize, Serialize};

/// Mint `quantity` fresh identifiers in one bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub namespace: Namespace,
    pub category: Category,
    pub quantity: usize,
    pub requestor_id: String,
    pub idempotency_key: String,
}

impl GenerateRequest {
    pub fn bucket(&self) -> BucketKey {
        BucketKey::new(self.namespace, self.category)
    }
}

/// Apply one lifecycle operation to client-named identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub ids: Vec<String>,
    pub requestor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub idempotency_key: String,
}

/// Identifiers issued by a `generate` call, all RESERVED, in allocation
/// order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generated {
    pub bucket: BucketKey,
    pub records: Vec<SctIdRecord>,
}

impl Generated {
    pub fn ids(&self) -> impl Iterator<Item = String> + '_ {
        self.records.iter().map(|r| r.id().to_string())
    }
}

/// What happened to one id of a [`TransitionRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IdOutcome {
    Applied {
        id: String,
        new_status: IdentifierStatus,
        /// `false` for an idempotent no-op.
        changed: bool,
        record: SctIdRecord,
    },
    Failed {
        id: String,
        error_kind: ErrorKind,
        reason: String,
    },
}

impl IdOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Applied { id, .. } | Self::Failed { id, .. } => id,
        }
    }

    pub const fn new_status(&self) -> Option<IdentifierStatus> {
        match self {
            Self::Applied { new_status, .. } => Some(*new_status),
            Self::Failed { .. } => None,
        }
    }

    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Applied { .. } => None,
            Self::Failed { error_kind, .. } => Some(*error_kind),
        }
    }
}

/// Per-id results of a transition request, in request order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub operation: Operation,
    pub outcomes: Vec<IdOutcome>,
}

impl BatchReport {
    pub fn all_applied(&self) -> bool {
        self.outcomes.iter().all(|o| o.error_kind().is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &IdOutcome> {
        self.outcomes.iter().filter(|o| o.error_kind().is_some())
    }
}

/// Operator view of one bucket's allocation state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSnapshot {
    pub bucket: BucketKey,
    pub watermark: u64,
    pub free_pool: usize,
    /// Sequences that can still be minted above the watermark.
    pub remaining: u64,
    pub recycle: RecyclePolicy,
}
