//! Durable identifier records and bucket allocation state.

mod file;
mod memory;
mod tables;

pub use file::*;
pub use memory::*;

use crate::{BucketKey, BucketState, Error, IdentifierStatus, Result, SctId, SctIdRecord, StatusFilter};
use chrono::{DateTime, Utc};

/// A compare-and-swap write of one record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// Status the stored record must currently have. `None` means the id
    /// must not have a record yet.
    pub expected: Option<IdentifierStatus>,
    /// Replacement record.
    pub record: SctIdRecord,
    /// New allocation state of the record's bucket, persisted in the same
    /// write.
    pub bucket: Option<BucketState>,
}

/// The single source of truth for identifier records.
///
/// Every mutating call is atomic: the records and the bucket state it
/// carries become durable together or not at all, before the call returns.
/// Backends report I/O and serialization failures as [`Error::Unavailable`].
pub trait RecordStore: Send + Sync {
    fn find(&self, id: SctId) -> Result<Option<SctIdRecord>>;

    /// # Errors
    /// [`Error::NotFound`] if `id` has no record.
    fn get(&self, id: SctId) -> Result<SctIdRecord> {
        self.find(id)?.ok_or_else(|| Error::not_found(id))
    }

    fn list_by_bucket(&self, key: BucketKey, filter: StatusFilter) -> Result<Vec<SctIdRecord>>;

    /// Last persisted allocation state of `key`, if any.
    fn load_bucket(&self, key: BucketKey) -> Result<Option<BucketState>>;

    /// Inserts freshly allocated records and the advanced bucket state.
    ///
    /// An existing AVAILABLE record is replaced (its sequence was recycled);
    /// an identical existing record is accepted as a replay.
    ///
    /// # Errors
    /// [`Error::Conflict`] if any id is held by a different record. Nothing
    /// is written in that case.
    fn put_new(&self, key: BucketKey, records: &[SctIdRecord], bucket: &BucketState) -> Result<()>;

    /// # Errors
    /// [`Error::Conflict`] if the stored status is not `change.expected`.
    fn transition(&self, change: &StatusChange) -> Result<()>;

    /// Moves `current` back to AVAILABLE and persists `bucket`, which should
    /// already list the sequence in its free pool.
    fn release(
        &self,
        current: &SctIdRecord,
        requestor_id: &str,
        comment: Option<String>,
        at: DateTime<Utc>,
        bucket: BucketState,
    ) -> Result<SctIdRecord> {
        let record = current.transitioned(IdentifierStatus::Available, requestor_id, comment, at);
        self.transition(&StatusChange {
            expected: Some(current.status()),
            record: record.clone(),
            bucket: Some(bucket),
        })?;
        Ok(record)
    }
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn find(&self, id: SctId) -> Result<Option<SctIdRecord>> {
        (**self).find(id)
    }

    fn list_by_bucket(&self, key: BucketKey, filter: StatusFilter) -> Result<Vec<SctIdRecord>> {
        (**self).list_by_bucket(key, filter)
    }

    fn load_bucket(&self, key: BucketKey) -> Result<Option<BucketState>> {
        (**self).load_bucket(key)
    }

    fn put_new(&self, key: BucketKey, records: &[SctIdRecord], bucket: &BucketState) -> Result<()> {
        (**self).put_new(key, records, bucket)
    }

    fn transition(&self, change: &StatusChange) -> Result<()> {
        (**self).transition(change)
    }
}
