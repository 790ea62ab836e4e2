use crate::{BucketKey, Error, RecyclePolicy, Result, SequenceAllocator};
use parking_lot::{FairMutex, FairMutexGuard, RwLock};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// One bucket's serialization unit.
///
/// A fair mutex hands the lock out in acquisition order, so requests on the
/// same bucket are served first come, first served.
#[derive(Debug)]
pub struct Bucket {
    key: BucketKey,
    allocator: FairMutex<SequenceAllocator>,
}

impl Bucket {
    pub fn new(allocator: SequenceAllocator) -> Self {
        Self {
            key: allocator.key(),
            allocator: FairMutex::new(allocator),
        }
    }

    pub const fn key(&self) -> BucketKey {
        self.key
    }

    /// Waits for the bucket lock until `deadline`.
    ///
    /// # Errors
    /// [`Error::Timeout`] if the deadline passes first. Nothing was done.
    pub fn lock_until(
        &self,
        started: Instant,
        deadline: Instant,
    ) -> Result<FairMutexGuard<'_, SequenceAllocator>> {
        self.allocator
            .try_lock_until(deadline)
            .ok_or_else(|| Error::Timeout {
                bucket: self.key,
                waited: started.elapsed(),
            })
    }

    pub fn lock_for(&self, timeout: Duration) -> Result<FairMutexGuard<'_, SequenceAllocator>> {
        let started = Instant::now();
        self.lock_until(started, started + timeout)
    }
}

/// Lazily populated map of every bucket touched by this process.
#[derive(Debug, Default)]
pub struct BucketRegistry {
    buckets: RwLock<HashMap<BucketKey, Arc<Bucket>>>,
    policy: RecyclePolicy,
}

impl BucketRegistry {
    pub fn new(policy: RecyclePolicy) -> Self {
        Self {
            buckets: RwLock::default(),
            policy,
        }
    }

    pub const fn policy(&self) -> RecyclePolicy {
        self.policy
    }

    pub fn get(&self, key: BucketKey) -> Option<Arc<Bucket>> {
        self.buckets.read().get(&key).cloned()
    }

    /// Returns the bucket for `key`, recovering it with `load` on first use.
    ///
    /// `load` runs without any registry lock held. If two callers race on
    /// the same new bucket, the first insert wins and the other allocator is
    /// dropped unused.
    pub fn get_or_load<F>(&self, key: BucketKey, load: F) -> Result<Arc<Bucket>>
    where
        F: FnOnce(BucketKey, RecyclePolicy) -> Result<SequenceAllocator>,
    {
        if let Some(bucket) = self.get(key) {
            return Ok(bucket);
        }
        let allocator = load(key, self.policy)?;
        let mut buckets = self.buckets.write();
        let bucket = buckets
            .entry(key)
            .or_insert_with(|| Arc::new(Bucket::new(allocator)));
        Ok(Arc::clone(bucket))
    }

    pub fn len(&self) -> usize {
        self.buckets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.read().is_empty()
    }
}
