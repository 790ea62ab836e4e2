//! Orchestrates client requests against buckets, the allocator, the store
//! and the lifecycle state machine.

mod idempotency;
mod retry;

use self::{
    idempotency::{Claim, IdempotencyCache, Replayable},
    retry::with_retry,
};
use crate::{
    AuditSink, BatchReport, Bucket, BucketKey, BucketRegistry, BucketSnapshot, Category,
    CoordinatorConfig, Error, ErrorKind, GenerateRequest, Generated, IdOutcome, IdentifierStatus, Namespace,
    Operation, RecordStore, Rejection, Result, SctId, SctIdRecord, SequenceAllocator,
    StatusChange, StatusFilter, TracingAuditSink, Transition, TransitionEvent, TransitionRequest,
    transition,
};
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::Instant,
};
use tracing::instrument;

/// Entry point of the allocation and lifecycle engine.
///
/// Every operation targeting a bucket runs under that bucket's lock, so
/// requests on one bucket are strictly serialized while different buckets
/// proceed in parallel. Store writes complete before the lock is released.
///
/// `Coordinator` is `Send + Sync` and meant to be shared (e.g. behind an
/// [`Arc`]) by all worker threads.
pub struct Coordinator<S> {
    store: S,
    registry: BucketRegistry,
    idempotency: IdempotencyCache,
    audit: Arc<dyn AuditSink>,
    config: CoordinatorConfig,
}

impl<S: RecordStore> Coordinator<S> {
    pub fn new(store: S, config: CoordinatorConfig) -> Self {
        Self {
            store,
            registry: BucketRegistry::new(config.recycle),
            idempotency: IdempotencyCache::new(
                config.idempotency_ttl,
                config.idempotency_capacity,
            ),
            audit: Arc::new(TracingAuditSink),
            config,
        }
    }

    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Issues `quantity` fresh RESERVED identifiers from one bucket.
    ///
    /// All or nothing: either every identifier is durably recorded together
    /// with the advanced watermark, or none is and the allocator is left
    /// untouched. Released sequences are reused (oldest first) before new
    /// ones are minted.
    ///
    /// # Errors
    /// - [`Error::BadRequest`] for an empty requestor or key, a zero or
    ///   oversized quantity, or a reused key with a different payload.
    /// - [`Error::Timeout`] if the bucket lock was not acquired in time.
    /// - [`Error::Exhausted`] if the bucket's sequence space is spent.
    /// - [`Error::Conflict`] on a store-level collision.
    /// - [`Error::Unavailable`] once store retries are exhausted.
    #[instrument(
        level = "debug",
        skip_all,
        fields(bucket = %request.bucket(), quantity = request.quantity, requestor = %request.requestor_id)
    )]
    pub fn generate(&self, request: &GenerateRequest) -> Result<Generated> {
        let started = Instant::now();
        self.validate_caller(&request.requestor_id, &request.idempotency_key)?;
        if request.quantity == 0 {
            return Err(Error::bad_request("quantity must be at least 1"));
        }
        self.validate_size(request.quantity, "quantity")?;

        let fingerprint = fingerprint("generate", request)?;
        let claim = match self.idempotency.claim(
            &request.requestor_id,
            &request.idempotency_key,
            fingerprint,
        )? {
            Claim::Replay(Replayable::Generated(generated)) => {
                tracing::debug!("replaying cached generate outcome");
                return Ok(generated);
            }
            Claim::Replay(Replayable::Batch(_)) => {
                return Err(Error::bad_request(
                    "idempotency key was already used for a different operation",
                ));
            }
            Claim::Fresh(claim) => claim,
        };

        let key = request.bucket();
        let bucket = self.bucket(key)?;
        let mut allocator = bucket.lock_until(started, started + self.config.lock_timeout)?;

        let mut recycled = HashSet::new();
        let plan = allocator.plan(request.quantity, |sequence| {
            let id = SctId::encode(key.namespace, key.partition(), sequence)
                .map_err(|source| Error::InvalidFormat {
                    id: sequence.to_string(),
                    source,
                })?;
            match self.find(id)? {
                Some(record) if record.status().is_held() => Ok(true),
                Some(_) => {
                    recycled.insert(sequence);
                    Ok(false)
                }
                None => Ok(false),
            }
        })?;

        let now = Utc::now();
        let records = plan
            .sequences
            .iter()
            .map(|&sequence| {
                SctId::encode(key.namespace, key.partition(), sequence)
                    .map(|id| {
                        SctIdRecord::new(
                            id,
                            IdentifierStatus::Reserved,
                            request.requestor_id.as_str(),
                            None,
                            now,
                        )
                    })
                    .map_err(|source| Error::InvalidFormat {
                        id: sequence.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        with_retry(&self.config.retry, "put_new", || {
            self.store.put_new(key, &records, &plan.next)
        })?;
        allocator.commit(plan.next);
        drop(allocator);

        for record in &records {
            let old_status = recycled
                .contains(&record.sequence())
                .then_some(IdentifierStatus::Available);
            self.emit(record, old_status);
        }

        tracing::debug!(
            issued = records.len(),
            recycled = recycled.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "generated identifiers"
        );

        let generated = Generated {
            bucket: key,
            records,
        };
        claim.complete(Replayable::Generated(generated.clone()));
        Ok(generated)
    }

    /// Reserves client-named identifiers. Unknown ids are created RESERVED.
    pub fn reserve(&self, request: &TransitionRequest) -> Result<BatchReport> {
        self.apply(Operation::Reserve, request)
    }

    /// Assigns identifiers. Unknown ids are imported directly as ASSIGNED.
    pub fn register(&self, request: &TransitionRequest) -> Result<BatchReport> {
        self.apply(Operation::Register, request)
    }

    pub fn publish(&self, request: &TransitionRequest) -> Result<BatchReport> {
        self.apply(Operation::Publish, request)
    }

    pub fn deprecate(&self, request: &TransitionRequest) -> Result<BatchReport> {
        self.apply(Operation::Deprecate, request)
    }

    /// Returns RESERVED or ASSIGNED identifiers to their bucket's free pool.
    pub fn release(&self, request: &TransitionRequest) -> Result<BatchReport> {
        self.apply(Operation::Release, request)
    }

    /// Applies `operation` to every id of `request` independently.
    ///
    /// Only request-level problems fail the call; a bad id is reported in
    /// its [`IdOutcome`] and the remaining ids are still processed. Outcomes
    /// are returned in request order.
    ///
    /// # Errors
    /// [`Error::BadRequest`] for an empty requestor, key or id list, an
    /// oversized batch, or a reused key with a different payload.
    #[instrument(
        level = "debug",
        skip_all,
        fields(operation = %operation, ids = request.ids.len(), requestor = %request.requestor_id)
    )]
    pub fn apply(&self, operation: Operation, request: &TransitionRequest) -> Result<BatchReport> {
        let started = Instant::now();
        let deadline = started + self.config.lock_timeout;
        self.validate_caller(&request.requestor_id, &request.idempotency_key)?;
        if request.ids.is_empty() {
            return Err(Error::bad_request("ids must not be empty"));
        }
        self.validate_size(request.ids.len(), "ids")?;

        let fingerprint = fingerprint(operation.as_str(), request)?;
        let claim = match self.idempotency.claim(
            &request.requestor_id,
            &request.idempotency_key,
            fingerprint,
        )? {
            Claim::Replay(Replayable::Batch(report)) if report.operation == operation => {
                tracing::debug!("replaying cached batch outcome");
                return Ok(report);
            }
            Claim::Replay(_) => {
                return Err(Error::bad_request(
                    "idempotency key was already used for a different operation",
                ));
            }
            Claim::Fresh(claim) => claim,
        };

        let mut outcomes: Vec<Option<IdOutcome>> = vec![None; request.ids.len()];
        let mut by_bucket: BTreeMap<BucketKey, Vec<(usize, SctId)>> = BTreeMap::new();
        for (slot, raw) in request.ids.iter().enumerate() {
            match SctId::decode(raw) {
                Ok(id) => by_bucket.entry(id.bucket()).or_default().push((slot, id)),
                Err(source) => {
                    let err = Error::InvalidFormat {
                        id: raw.clone(),
                        source,
                    };
                    outcomes[slot] = Some(failed(raw, &err));
                }
            }
        }

        for (key, ids) in by_bucket {
            let bucket = match self.bucket(key) {
                Ok(bucket) => bucket,
                Err(err) => {
                    fail_all(&mut outcomes, &ids, &err);
                    continue;
                }
            };
            let mut allocator = match bucket.lock_until(started, deadline) {
                Ok(guard) => guard,
                Err(err) => {
                    tracing::warn!(bucket = %key, error = %err, "bucket lock timed out");
                    fail_all(&mut outcomes, &ids, &err);
                    continue;
                }
            };

            let now = Utc::now();
            for (slot, id) in ids {
                let outcome = if Instant::now() >= deadline {
                    failed(
                        &id.to_string(),
                        &Error::Timeout {
                            bucket: key,
                            waited: started.elapsed(),
                        },
                    )
                } else {
                    match self.apply_one(&mut allocator, operation, id, request, now) {
                        Ok((record, changed)) => IdOutcome::Applied {
                            id: id.to_string(),
                            new_status: record.status(),
                            changed,
                            record,
                        },
                        Err(err) => failed(&id.to_string(), &err),
                    }
                };
                outcomes[slot] = Some(outcome);
            }
        }

        let report = BatchReport {
            operation,
            outcomes: outcomes.into_iter().flatten().collect(),
        };

        let transient = report.failures().any(|o| {
            matches!(
                o.error_kind(),
                Some(ErrorKind::Timeout | ErrorKind::Unavailable)
            )
        });
        tracing::debug!(
            failed = report.failures().count(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "applied batch"
        );
        // Transient failures are not cached so a retry with the same key
        // gets another attempt.
        if !transient {
            claim.complete(Replayable::Batch(report.clone()));
        }
        Ok(report)
    }

    /// Snapshot of one identifier.
    ///
    /// # Errors
    /// [`Error::InvalidFormat`] for a malformed id, [`Error::NotFound`] if it
    /// was never issued.
    pub fn lookup(&self, id: &str) -> Result<SctIdRecord> {
        let id = decode(id)?;
        self.find(id)?.ok_or_else(|| Error::not_found(id))
    }

    /// Snapshots of many identifiers, in request order. Valid identifiers
    /// that were never issued come back as unpersisted AVAILABLE records.
    ///
    /// # Errors
    /// [`Error::BadRequest`] for an oversized batch, [`Error::InvalidFormat`]
    /// on the first malformed id.
    pub fn lookup_many<I, T>(&self, ids: I) -> Result<Vec<SctIdRecord>>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let ids: Vec<T> = ids.into_iter().collect();
        self.validate_size(ids.len(), "ids")?;
        let ids = ids
            .iter()
            .map(|id| decode(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let now = Utc::now();
        ids.into_iter()
            .map(|id| Ok(self.find(id)?.unwrap_or_else(|| SctIdRecord::unissued(id, now))))
            .collect()
    }

    /// Operator view of a bucket's watermark and free pool.
    ///
    /// # Errors
    /// [`Error::Timeout`] if the bucket is busy for longer than the lock
    /// timeout.
    pub fn bucket_snapshot(&self, namespace: Namespace, category: Category) -> Result<BucketSnapshot> {
        let key = BucketKey::new(namespace, category);
        let bucket = self.bucket(key)?;
        let allocator = bucket.lock_for(self.config.lock_timeout)?;
        Ok(BucketSnapshot {
            bucket: key,
            watermark: allocator.state().watermark,
            free_pool: allocator.state().free_pool.len(),
            remaining: allocator.remaining(),
            recycle: allocator.policy(),
        })
    }

    /// One transition, run under the bucket lock. The allocator is only
    /// updated after the store accepted the write.
    fn apply_one(
        &self,
        allocator: &mut SequenceAllocator,
        operation: Operation,
        id: SctId,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<(SctIdRecord, bool)> {
        let current = self.find(id)?;
        let step = transition(current.as_ref().map(SctIdRecord::status), operation)
            .map_err(|rejection| rejected(id, rejection))?;

        let requestor = request.requestor_id.as_str();
        let comment = request.comment.clone();
        let sequence = id.sequence();

        let (record, bucket) = match (step, current.as_ref()) {
            (Transition::Unchanged { .. }, Some(record)) => return Ok((record.clone(), false)),
            (Transition::Apply { .. }, Some(record)) if step.releases_sequence() => {
                let next = allocator.recycled(sequence);
                let released = with_retry(&self.config.retry, "release", || {
                    self.store
                        .release(record, requestor, comment.clone(), now, next.clone())
                })?;
                allocator.commit(next);
                self.emit(&released, Some(record.status()));
                return Ok((released, true));
            }
            (Transition::Apply { to, .. }, Some(record)) => {
                let bucket = step.claims_sequence().then(|| allocator.claimed(sequence));
                (record.transitioned(to, requestor, comment, now), bucket)
            }
            (Transition::Create { to }, None) => (
                SctIdRecord::new(id, to, requestor, comment, now),
                Some(allocator.claimed(sequence)),
            ),
            _ => {
                return Err(Error::conflict(id, "record changed while being read"));
            }
        };

        let change = StatusChange {
            expected: current.as_ref().map(SctIdRecord::status),
            record,
            bucket,
        };
        with_retry(&self.config.retry, "transition", || {
            self.store.transition(&change)
        })?;
        if let Some(next) = change.bucket {
            allocator.commit(next);
        }
        self.emit(&change.record, change.expected);
        Ok((change.record, true))
    }

    fn bucket(&self, key: BucketKey) -> Result<Arc<Bucket>> {
        self.registry.get_or_load(key, |key, policy| {
            let persisted = with_retry(&self.config.retry, "load_bucket", || {
                self.store.load_bucket(key)
            })?;
            let records = with_retry(&self.config.retry, "list_by_bucket", || {
                self.store.list_by_bucket(key, StatusFilter::Any)
            })?;
            let allocator = SequenceAllocator::recover(key, persisted, &records, policy);
            tracing::info!(
                bucket = %key,
                records = records.len(),
                watermark = allocator.state().watermark,
                free_pool = allocator.state().free_pool.len(),
                "recovered bucket"
            );
            Ok(allocator)
        })
    }

    fn find(&self, id: SctId) -> Result<Option<SctIdRecord>> {
        with_retry(&self.config.retry, "find", || self.store.find(id))
    }

    fn emit(&self, record: &SctIdRecord, old_status: Option<IdentifierStatus>) {
        self.audit.record(&TransitionEvent {
            id: record.id(),
            old_status,
            new_status: record.status(),
            requestor_id: record.requestor_id().to_owned(),
            timestamp: record.last_modified_at(),
        });
    }

    fn validate_caller(&self, requestor_id: &str, idempotency_key: &str) -> Result<()> {
        if requestor_id.trim().is_empty() {
            return Err(Error::bad_request("requestorId must not be empty"));
        }
        if idempotency_key.trim().is_empty() {
            return Err(Error::bad_request("idempotencyKey must not be empty"));
        }
        Ok(())
    }

    fn validate_size(&self, len: usize, what: &str) -> Result<()> {
        let max = self.config.max_batch_size;
        if len > max {
            return Err(Error::bad_request(format!(
                "{what} of {len} exceeds the maximum batch size of {max}"
            )));
        }
        Ok(())
    }
}

fn decode(id: &str) -> Result<SctId> {
    SctId::decode(id).map_err(|source| Error::InvalidFormat {
        id: id.to_owned(),
        source,
    })
}

fn rejected(id: SctId, rejection: Rejection) -> Error {
    match rejection {
        Rejection::Unknown { .. } => Error::not_found(id),
        Rejection::Illegal { .. } => Error::conflict(id, rejection.to_string()),
    }
}

fn fail_all(outcomes: &mut [Option<IdOutcome>], ids: &[(usize, SctId)], err: &Error) {
    for (slot, id) in ids {
        outcomes[*slot] = Some(failed(&id.to_string(), err));
    }
}

fn failed(id: &str, err: &Error) -> IdOutcome {
    IdOutcome::Failed {
        id: id.to_owned(),
        error_kind: err.kind(),
        reason: err.to_string(),
    }
}

fn fingerprint<T: serde::Serialize>(operation: &str, request: &T) -> Result<String> {
    Ok(format!("{operation}:{}", serde_json::to_string(request)?))
}
