use super::tables::Tables;
use crate::{
    BucketKey, BucketState, RecordStore, Result, SctId, SctIdRecord, StatusChange, StatusFilter,
};
use parking_lot::RwLock;

/// Volatile [`RecordStore`]. Everything is lost when the value is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn find(&self, id: SctId) -> Result<Option<SctIdRecord>> {
        Ok(self.tables.read().find(id).cloned())
    }

    fn list_by_bucket(&self, key: BucketKey, filter: StatusFilter) -> Result<Vec<SctIdRecord>> {
        Ok(self.tables.read().list_by_bucket(key, filter))
    }

    fn load_bucket(&self, key: BucketKey) -> Result<Option<BucketState>> {
        Ok(self.tables.read().bucket(key).cloned())
    }

    fn put_new(&self, key: BucketKey, records: &[SctIdRecord], bucket: &BucketState) -> Result<()> {
        let mut tables = self.tables.write();
        let mutation = tables.prepare_put(key, records, bucket)?;
        tables.apply(mutation);
        Ok(())
    }

    fn transition(&self, change: &StatusChange) -> Result<()> {
        let mut tables = self.tables.write();
        let mutation = tables.prepare_transition(change)?;
        tables.apply(mutation);
        Ok(())
    }
}
