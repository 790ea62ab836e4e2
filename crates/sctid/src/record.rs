use crate::{BucketKey, IdentifierStatus, Namespace, PartitionId, SctId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable state of one identifier.
///
/// Records are immutable snapshots: every lifecycle change produces a new
/// value through [`SctIdRecord::transitioned`], and only the store replaces
/// the persisted copy. The decoded components are kept next to `id` so
/// bucket scans never have to re-parse identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SctIdRecord {
    id: SctId,
    status: IdentifierStatus,
    namespace: Namespace,
    partition_id: PartitionId,
    sequence: u64,
    requestor_id: String,
    created_at: DateTime<Utc>,
    last_modified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

impl SctIdRecord {
    /// A brand-new record. Creation and last-modification times are equal.
    pub fn new(
        id: SctId,
        status: IdentifierStatus,
        requestor_id: impl Into<String>,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status,
            namespace: id.namespace(),
            partition_id: id.partition(),
            sequence: id.sequence(),
            requestor_id: requestor_id.into(),
            created_at: at,
            last_modified_at: at,
            comment,
        }
    }

    /// Snapshot for a valid identifier nobody has issued yet. Never persisted.
    pub fn unissued(id: SctId, at: DateTime<Utc>) -> Self {
        Self::new(id, IdentifierStatus::Available, String::new(), None, at)
    }

    /// The same identifier moved to `status` by `requestor_id`.
    ///
    /// `created_at` is preserved; a `None` comment keeps the previous one.
    pub fn transitioned(
        &self,
        status: IdentifierStatus,
        requestor_id: impl Into<String>,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            requestor_id: requestor_id.into(),
            last_modified_at: at,
            comment: comment.or_else(|| self.comment.clone()),
            ..self.clone()
        }
    }

    pub const fn id(&self) -> SctId {
        self.id
    }

    pub const fn status(&self) -> IdentifierStatus {
        self.status
    }

    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub const fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn requestor_id(&self) -> &str {
        &self.requestor_id
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn last_modified_at(&self) -> DateTime<Utc> {
        self.last_modified_at
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn bucket(&self) -> BucketKey {
        self.id.bucket()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transition_keeps_identity_and_creation_time() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let id: SctId = "138875005".parse().unwrap();
        let reserved = SctIdRecord::new(
            id,
            IdentifierStatus::Reserved,
            "alice",
            Some("batch 7".into()),
            t0,
        );
        let assigned = reserved.transitioned(IdentifierStatus::Assigned, "bob", None, t1);

        assert_eq!(assigned.id(), id);
        assert_eq!(assigned.sequence(), 138_875);
        assert_eq!(assigned.status(), IdentifierStatus::Assigned);
        assert_eq!(assigned.requestor_id(), "bob");
        assert_eq!(assigned.created_at(), t0);
        assert_eq!(assigned.last_modified_at(), t1);
        assert_eq!(assigned.comment(), Some("batch 7"));
        assert_eq!(reserved.status(), IdentifierStatus::Reserved);
    }

    #[test]
    fn serializes_camel_case_with_components() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let id: SctId = "11000154102".parse().unwrap();
        let record = SctIdRecord::new(id, IdentifierStatus::Reserved, "alice", None, at);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "11000154102");
        assert_eq!(json["status"], "RESERVED");
        assert_eq!(json["namespace"], 1_000_154);
        assert_eq!(json["partitionId"], 10);
        assert_eq!(json["sequence"], 1);
        assert!(json.get("comment").is_none());
        let back: SctIdRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
