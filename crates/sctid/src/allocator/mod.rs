//! Per-bucket sequence allocation.
//!
//! A [`SequenceAllocator`] owns the watermark and free pool of exactly one
//! [`BucketKey`]. It never touches storage: callers plan an allocation,
//! persist the resulting [`BucketState`] together with the new records, and
//! only then [`commit`](SequenceAllocator::commit) it. A failed write leaves
//! the in-memory state untouched.

mod registry;

pub use registry::*;

use crate::{Category, Error, IdentifierStatus, Namespace, PartitionId, Result, SctIdRecord, SequenceSpace};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// The `(namespace, category)` unit of counter ownership and lock granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub namespace: Namespace,
    pub category: Category,
}

impl BucketKey {
    pub const fn new(namespace: Namespace, category: Category) -> Self {
        Self {
            namespace,
            category,
        }
    }

    pub fn partition(self) -> PartitionId {
        self.category.partition(self.namespace)
    }

    pub const fn space(self) -> SequenceSpace {
        SequenceSpace::for_namespace(self.namespace)
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.category)
    }
}

/// What happens to a sequence whose record is released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecyclePolicy {
    /// Released sequences go back to the free pool and are handed out again.
    #[default]
    Reuse,
    /// Released sequences are never issued again.
    Retire,
}

impl core::str::FromStr for RecyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reuse" => Ok(Self::Reuse),
            "retire" => Ok(Self::Retire),
            other => Err(format!("unknown recycle policy: {other}")),
        }
    }
}

/// Durable allocation state of one bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketState {
    /// Highest sequence ever handed out (or claimed). `space.first - 1` for
    /// a fresh bucket.
    pub watermark: u64,
    /// Released sequences awaiting reuse, oldest first.
    #[serde(default)]
    pub free_pool: VecDeque<u64>,
}

impl BucketState {
    pub fn fresh(key: BucketKey) -> Self {
        Self {
            watermark: key.space().first - 1,
            free_pool: VecDeque::new(),
        }
    }
}

/// Sequences chosen for one `generate` call together with the bucket state
/// that must be persisted before they are issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub sequences: Vec<u64>,
    pub next: BucketState,
}

/// Watermark plus free pool for a single bucket.
#[derive(Debug)]
pub struct SequenceAllocator {
    key: BucketKey,
    state: BucketState,
    policy: RecyclePolicy,
}

impl SequenceAllocator {
    pub fn new(key: BucketKey, policy: RecyclePolicy) -> Self {
        Self {
            key,
            state: BucketState::fresh(key),
            policy,
        }
    }

    /// Rebuilds the allocator from what the store persisted.
    ///
    /// The watermark becomes the larger of the persisted watermark and the
    /// highest recorded sequence, so it never rewinds and never re-mints an
    /// imported id. The pool keeps persisted entries whose record is still
    /// AVAILABLE and picks up AVAILABLE records the pool lost, oldest
    /// modification first.
    pub fn recover(
        key: BucketKey,
        persisted: Option<BucketState>,
        records: &[SctIdRecord],
        policy: RecyclePolicy,
    ) -> Self {
        let persisted = persisted.unwrap_or_else(|| BucketState::fresh(key));
        let watermark = records
            .iter()
            .map(SctIdRecord::sequence)
            .fold(persisted.watermark, u64::max);

        let available: HashMap<u64, &SctIdRecord> = records
            .iter()
            .filter(|r| r.status() == IdentifierStatus::Available)
            .map(|r| (r.sequence(), r))
            .collect();

        let mut free_pool = VecDeque::new();
        if policy == RecyclePolicy::Reuse {
            let mut pooled = std::collections::HashSet::new();
            for seq in persisted.free_pool {
                if available.contains_key(&seq) && pooled.insert(seq) {
                    free_pool.push_back(seq);
                }
            }
            let mut missing: Vec<&SctIdRecord> = available
                .values()
                .filter(|r| !pooled.contains(&r.sequence()))
                .copied()
                .collect();
            missing.sort_by_key(|r| (r.last_modified_at(), r.sequence()));
            free_pool.extend(missing.into_iter().map(SctIdRecord::sequence));
        }

        Self {
            key,
            state: BucketState {
                watermark,
                free_pool,
            },
            policy,
        }
    }

    pub const fn key(&self) -> BucketKey {
        self.key
    }

    pub const fn policy(&self) -> RecyclePolicy {
        self.policy
    }

    pub const fn state(&self) -> &BucketState {
        &self.state
    }

    /// Sequences above the watermark that can still be minted.
    pub const fn remaining(&self) -> u64 {
        self.key.space().last.saturating_sub(self.state.watermark)
    }

    /// Chooses `count` sequences without mutating the allocator.
    ///
    /// The free pool is drained oldest first, then new sequences are minted
    /// above the watermark. `is_held` reports whether a candidate already
    /// backs a non-AVAILABLE record; such candidates are skipped (and dropped
    /// from the pool).
    ///
    /// # Errors
    /// - [`Error::Exhausted`] if the bucket cannot supply `count` sequences.
    /// - Whatever `is_held` returns.
    pub fn plan<F>(&self, count: usize, mut is_held: F) -> Result<Allocation>
    where
        F: FnMut(u64) -> Result<bool>,
    {
        let mut next = self.state.clone();
        let mut sequences = Vec::with_capacity(count);

        while sequences.len() < count {
            let Some(seq) = next.free_pool.pop_front() else {
                break;
            };
            if !is_held(seq)? {
                sequences.push(seq);
            }
        }

        let last = self.key.space().last;
        while sequences.len() < count {
            if next.watermark >= last {
                return Err(Error::Exhausted { bucket: self.key });
            }
            next.watermark += 1;
            if !is_held(next.watermark)? {
                sequences.push(next.watermark);
            }
        }

        Ok(Allocation { sequences, next })
    }

    /// Installs a planned state after it was persisted.
    pub fn commit(&mut self, next: BucketState) {
        debug_assert!(next.watermark >= self.state.watermark);
        self.state = next;
    }

    /// State after `sequence` becomes held by a claimed (imported or pinned)
    /// record: out of the pool, watermark at least `sequence`.
    pub fn claimed(&self, sequence: u64) -> BucketState {
        let mut next = self.state.clone();
        next.free_pool.retain(|&s| s != sequence);
        next.watermark = next.watermark.max(sequence);
        next
    }

    /// State after `sequence` is released. With [`RecyclePolicy::Retire`]
    /// the pool is left alone.
    pub fn recycled(&self, sequence: u64) -> BucketState {
        let mut next = self.state.clone();
        if self.policy == RecyclePolicy::Reuse && !next.free_pool.contains(&sequence) {
            next.free_pool.push_back(sequence);
        }
        next
    }
}
