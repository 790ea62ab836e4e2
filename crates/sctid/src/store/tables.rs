use crate::{
    BucketKey, BucketState, Error, Result, SctId, SctIdRecord, StatusChange, StatusFilter,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One atomic unit of change. The file backend writes exactly one of these
/// per journal line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Mutation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<SctIdRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<BucketEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BucketEntry {
    pub key: BucketKey,
    pub state: BucketState,
}

/// In-memory image shared by both backends. Records are grouped per bucket
/// and ordered by sequence.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    records: HashMap<BucketKey, BTreeMap<u64, SctIdRecord>>,
    buckets: HashMap<BucketKey, BucketState>,
}

impl Tables {
    pub fn find(&self, id: SctId) -> Option<&SctIdRecord> {
        self.records.get(&id.bucket())?.get(&id.sequence())
    }

    pub fn list_by_bucket(&self, key: BucketKey, filter: StatusFilter) -> Vec<SctIdRecord> {
        self.records
            .get(&key)
            .map(|records| {
                records
                    .values()
                    .filter(|r| filter.matches(r.status()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn bucket(&self, key: BucketKey) -> Option<&BucketState> {
        self.buckets.get(&key)
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    /// Validates a `put_new` and turns it into a mutation.
    pub fn prepare_put(
        &self,
        key: BucketKey,
        records: &[SctIdRecord],
        bucket: &BucketState,
    ) -> Result<Mutation> {
        for record in records {
            if record.bucket() != key {
                return Err(Error::bad_request(format!(
                    "identifier {} does not belong to bucket {key}",
                    record.id()
                )));
            }
            match self.find(record.id()) {
                Some(existing) if existing == record => {}
                Some(existing) if existing.status().is_held() => {
                    return Err(Error::conflict(
                        record.id(),
                        format!("already exists with status {}", existing.status()),
                    ));
                }
                _ => {}
            }
        }
        Ok(Mutation {
            records: records.to_vec(),
            buckets: vec![BucketEntry {
                key,
                state: bucket.clone(),
            }],
        })
    }

    /// Validates a compare-and-swap and turns it into a mutation.
    pub fn prepare_transition(&self, change: &StatusChange) -> Result<Mutation> {
        let id = change.record.id();
        let current = self.find(id).map(SctIdRecord::status);
        if current != change.expected {
            let found = current.map_or("no record", |s| s.as_str());
            return Err(Error::conflict(
                id,
                format!("modified concurrently (now {found})"),
            ));
        }
        Ok(Mutation {
            records: vec![change.record.clone()],
            buckets: change
                .bucket
                .iter()
                .map(|state| BucketEntry {
                    key: change.record.bucket(),
                    state: state.clone(),
                })
                .collect(),
        })
    }

    pub fn apply(&mut self, mutation: Mutation) {
        for record in mutation.records {
            self.records
                .entry(record.bucket())
                .or_default()
                .insert(record.sequence(), record);
        }
        for BucketEntry { key, state } in mutation.buckets {
            self.buckets.insert(key, state);
        }
    }

    /// The whole image as a sequence of mutations, one per bucket state and
    /// one per batch of records.
    pub fn snapshot(&self, batch: usize) -> Vec<Mutation> {
        let mut out: Vec<Mutation> = self
            .buckets
            .iter()
            .map(|(key, state)| Mutation {
                records: Vec::new(),
                buckets: vec![BucketEntry {
                    key: *key,
                    state: state.clone(),
                }],
            })
            .collect();
        for records in self.records.values() {
            let all: Vec<SctIdRecord> = records.values().cloned().collect();
            for chunk in all.chunks(batch.max(1)) {
                out.push(Mutation {
                    records: chunk.to_vec(),
                    buckets: Vec::new(),
                });
            }
        }
        out
    }
}
