//! Bounded, TTL-based cache of completed request outcomes.
//!
//! Keys are scoped per client: the cache maps `(client_id, key)` to an entry,
//! so two principals choosing the same key never see each other's requests.
//! A request first *claims* its idempotency key. The claim either replays a
//! cached outcome, or hands back a [`ClaimGuard`] that marks the key as in
//! flight until the request completes. A guard dropped without
//! [`ClaimGuard::complete`] frees the key so the client can retry.

use crate::{BatchReport, Error, Generated, Result};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Outcomes worth replaying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Replayable {
    Generated(Generated),
    Batch(BatchReport),
}

#[derive(Debug)]
enum Entry {
    Pending {
        fingerprint: String,
    },
    Done {
        fingerprint: String,
        value: Replayable,
        inserted_at: Instant,
    },
}

impl Entry {
    fn fingerprint(&self) -> &str {
        match self {
            Self::Pending { fingerprint } | Self::Done { fingerprint, .. } => fingerprint,
        }
    }
}

/// `(client_id, idempotency_key)`.
type ScopedKey = (String, String);

#[derive(Debug)]
pub(crate) struct IdempotencyCache {
    entries: Mutex<HashMap<ScopedKey, Entry>>,
    ttl: Duration,
    capacity: usize,
}

pub(crate) enum Claim<'a> {
    Fresh(ClaimGuard<'a>),
    Replay(Replayable),
}

impl IdempotencyCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// # Errors
    /// - [`Error::BadRequest`] if `key` was used for a different payload.
    /// - [`Error::Conflict`] if a request with `key` is still running.
    pub fn claim(&self, client_id: &str, key: &str, fingerprint: String) -> Result<Claim<'_>> {
        let scoped = (client_id.to_owned(), key.to_owned());
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&scoped) {
            let expired = matches!(entry, Entry::Done { inserted_at, .. } if inserted_at.elapsed() >= self.ttl);
            if !expired {
                if entry.fingerprint() != fingerprint {
                    return Err(Error::bad_request(format!(
                        "idempotency key {key:?} was already used for a different request"
                    )));
                }
                return match entry {
                    Entry::Done { value, .. } => Ok(Claim::Replay(value.clone())),
                    Entry::Pending { .. } => Err(Error::conflict(
                        key,
                        "a request with this idempotency key is still in progress",
                    )),
                };
            }
        }
        entries.insert(scoped.clone(), Entry::Pending { fingerprint });
        Ok(Claim::Fresh(ClaimGuard {
            cache: self,
            key: scoped,
            completed: false,
        }))
    }

    /// Cached outcome for `client_id`'s `key`, if completed and not expired.
    pub fn peek(&self, client_id: &str, key: &str) -> Option<Replayable> {
        let scoped = (client_id.to_owned(), key.to_owned());
        match self.entries.lock().get(&scoped)? {
            Entry::Done {
                value, inserted_at, ..
            } if inserted_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn finish(&self, key: &ScopedKey, value: Option<Replayable>) {
        let mut entries = self.entries.lock();
        let Some(Entry::Pending { fingerprint }) = entries.remove(key) else {
            return;
        };
        let Some(value) = value else {
            return;
        };
        if self.capacity == 0 {
            return;
        }
        if entries.len() >= self.capacity {
            self.evict(&mut entries);
        }
        entries.insert(
            key.clone(),
            Entry::Done {
                fingerprint,
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops expired outcomes, then the oldest tenth if still full.
    /// In-flight claims are never evicted.
    fn evict(&self, entries: &mut HashMap<ScopedKey, Entry>) {
        let ttl = self.ttl;
        entries.retain(|_, entry| match entry {
            Entry::Done { inserted_at, .. } => inserted_at.elapsed() < ttl,
            Entry::Pending { .. } => true,
        });
        if entries.len() < self.capacity {
            return;
        }
        let mut done: Vec<(Instant, ScopedKey)> = entries
            .iter()
            .filter_map(|(key, entry)| match entry {
                Entry::Done { inserted_at, .. } => Some((*inserted_at, key.clone())),
                Entry::Pending { .. } => None,
            })
            .collect();
        done.sort_unstable();
        let drop = (self.capacity / 10).max(1);
        for (_, key) in done.into_iter().take(drop) {
            entries.remove(&key);
        }
    }
}

/// Exclusive claim on an idempotency key.
pub(crate) struct ClaimGuard<'a> {
    cache: &'a IdempotencyCache,
    key: ScopedKey,
    completed: bool,
}

impl ClaimGuard<'_> {
    /// Stores `value` for replay and releases the claim.
    pub fn complete(mut self, value: Replayable) {
        self.completed = true;
        self.cache.finish(&self.key, Some(value));
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.cache.finish(&self.key, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BucketKey, Category, Namespace};

    fn value(n: usize) -> Replayable {
        Replayable::Generated(Generated {
            bucket: BucketKey::new(Namespace::CORE, Category::Concept),
            records: Vec::with_capacity(n),
        })
    }

    fn fresh(claim: Result<Claim<'_>>) -> ClaimGuard<'_> {
        match claim.unwrap() {
            Claim::Fresh(guard) => guard,
            Claim::Replay(_) => panic!("expected a fresh claim"),
        }
    }

    #[test]
    fn completed_outcomes_replay() {
        let cache = IdempotencyCache::new(Duration::from_secs(60), 10);
        fresh(cache.claim("alice", "k", "fp".into())).complete(value(1));
        match cache.claim("alice", "k", "fp".into()).unwrap() {
            Claim::Replay(v) => assert_eq!(v, value(1)),
            Claim::Fresh(_) => panic!("expected replay"),
        }
        assert_eq!(cache.peek("alice", "k"), Some(value(1)));
    }

    #[test]
    fn mismatched_payload_is_a_bad_request() {
        let cache = IdempotencyCache::new(Duration::from_secs(60), 10);
        fresh(cache.claim("alice", "k", "a".into())).complete(value(1));
        assert!(matches!(
            cache.claim("alice", "k", "b".into()),
            Err(Error::BadRequest { .. })
        ));
    }

    #[test]
    fn in_flight_key_is_a_conflict_until_released() {
        let cache = IdempotencyCache::new(Duration::from_secs(60), 10);
        let guard = fresh(cache.claim("alice", "k", "fp".into()));
        assert!(matches!(
            cache.claim("alice", "k", "fp".into()),
            Err(Error::Conflict { .. })
        ));
        drop(guard);
        assert_eq!(cache.len(), 0);
        let _again = fresh(cache.claim("alice", "k", "fp".into()));
    }

    #[test]
    fn expired_outcomes_are_forgotten() {
        let cache = IdempotencyCache::new(Duration::from_millis(5), 10);
        fresh(cache.claim("alice", "k", "a".into())).complete(value(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.peek("alice", "k"), None);
        // A different payload may reuse an expired key.
        let _guard = fresh(cache.claim("alice", "k", "b".into()));
    }

    #[test]
    fn capacity_is_bounded() {
        let cache = IdempotencyCache::new(Duration::from_secs(60), 20);
        for i in 0..100 {
            fresh(cache.claim("alice", &format!("k{i}"), "fp".into())).complete(value(i));
        }
        assert!(cache.len() <= 20);
        assert!(cache.peek("alice", "k99").is_some());
        assert!(cache.peek("alice", "k0").is_none());
    }

    #[test]
    fn keys_are_scoped_to_the_client() {
        let cache = IdempotencyCache::new(Duration::from_secs(60), 10);
        fresh(cache.claim("alice", "1", "a".into())).complete(value(1));
        let carol = fresh(cache.claim("carol", "1", "c".into()));
        assert!(cache.peek("carol", "1").is_none());
        carol.complete(value(2));
        assert_eq!(cache.peek("alice", "1"), Some(value(1)));
        assert_eq!(cache.peek("carol", "1"), Some(value(2)));
        assert_eq!(cache.len(), 2);
    }
}
