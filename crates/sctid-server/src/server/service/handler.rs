//! Envelope entry point.
//!
//! [`SctIdService`] turns one request line into one reply: it parses the
//! envelope, resolves the credential through the [`Authorizer`], and hands the
//! command to the worker pool. Authorization happens before any engine call.
//! An unknown credential never reaches a worker.

use crate::server::{
    error::{Result, ServiceError},
    pool::{manager::WorkerPool, request::WorkRequest, worker::worker_loop},
    protocol::{Envelope, Payload, Reply},
    service::config::ServiceConfig,
};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use sctid::{Authorizer, Coordinator, RecordStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Counts requests between envelope parsing and reply, and refuses new ones
/// once closed.
#[derive(Debug, Default)]
pub struct Inflight {
    count: AtomicUsize,
    closed: AtomicBool,
}

impl Inflight {
    /// Registers a request. `None` once [`Inflight::close`] was called.
    pub fn enter(&self) -> Option<InflightGuard<'_>> {
        // Increment before checking so a concurrent drain never sees zero
        // while an admitted request is still running.
        self.count.fetch_add(1, Ordering::SeqCst);
        let guard = InflightGuard(self);
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        Some(guard)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

pub struct InflightGuard<'a>(&'a Inflight);

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct SctIdService {
    authorizer: Arc<dyn Authorizer>,
    worker_pool: Arc<WorkerPool>,
    inflight: Arc<Inflight>,
    max_line_bytes: usize,
}

impl SctIdService {
    /// Creates the service and spawns `config.num_workers` worker tasks
    /// sharing `coordinator`.
    ///
    /// Each worker has a channel of capacity one: a request is only handed
    /// to a worker once it has finished the previous one, so a slow bucket
    /// lock on one worker never queues work behind it.
    pub fn new<S, A>(coordinator: Coordinator<S>, authorizer: A, config: &ServiceConfig) -> Self
    where
        S: RecordStore + 'static,
        A: Authorizer + 'static,
    {
        let coordinator = Arc::new(coordinator);
        let inflight = Arc::new(Inflight::default());
        let shutdown_token = CancellationToken::new();
        let num_workers = config.num_workers.max(1);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(1);
            workers.push(tx);
            tokio::spawn(worker_loop(
                worker_id,
                rx,
                Arc::clone(&coordinator),
                shutdown_token.clone(),
            ));
        }

        let worker_pool = WorkerPool::new(
            workers,
            Arc::clone(&inflight),
            shutdown_token,
            config.shutdown_timeout,
        );

        Self {
            authorizer: Arc::new(authorizer),
            worker_pool: Arc::new(worker_pool),
            inflight,
            max_line_bytes: config.max_line_bytes,
        }
    }

    pub const fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Cancelled once shutdown has drained in-flight requests.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.worker_pool.shutdown_token().clone()
    }

    /// Handles one request line. Always produces a reply.
    pub async fn handle_line(&self, line: &str) -> Reply {
        Reply::from(self.dispatch(line).await)
    }

    #[tracing::instrument(skip_all, fields(op))]
    async fn dispatch(&self, line: &str) -> Result<Payload> {
        let Some(_guard) = self.inflight.enter() else {
            return Err(ServiceError::ServiceShutdown);
        };
        let envelope = Envelope::parse(line)?;
        tracing::Span::current().record("op", envelope.command.name());

        let principal = self
            .authorizer
            .authorize(envelope.credential.as_deref())
            .inspect_err(|e| tracing::warn!(error = %e, "rejected credential"))?;

        let (response, rx) = oneshot::channel();
        self.worker_pool
            .send_to_next_worker(WorkRequest::Execute {
                principal,
                command: envelope.command,
                response,
            })
            .await?;

        let result = rx.await.map_err(|_| ServiceError::ChannelError {
            context: "worker dropped the request".into(),
        })?;
        if let Err(e) = &result {
            tracing::debug!(kind = %e.kind(), error = %e, "request failed");
        }
        result
    }

    /// Initiates a graceful shutdown of the worker pool.
    ///
    /// New requests are refused immediately, in-flight ones get the
    /// configured drain window, then workers are stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.worker_pool.shutdown().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inflight.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use sctid::{CoordinatorConfig, FileStore, MemoryStore, StaticTokenAuthorizer};
    use serde_json::{Value, json};

    fn service_with<S: RecordStore + 'static>(store: S, num_workers: usize) -> SctIdService {
        SctIdService::new(
            Coordinator::new(store, CoordinatorConfig::default()),
            StaticTokenAuthorizer::new([("s3cret", "alice"), ("other", "bob")]),
            &ServiceConfig {
                num_workers,
                shutdown_timeout: Duration::from_secs(1),
                ..ServiceConfig::default()
            },
        )
    }

    async fn call(service: &SctIdService, request: Value) -> Value {
        let line = service.handle_line(&request.to_string()).await.to_line();
        serde_json::from_str(&line).unwrap()
    }

    fn generate(key: &str, quantity: usize) -> Value {
        json!({
            "credential": "s3cret",
            "op": "generate",
            "namespace": 1000154,
            "category": "CONCEPT",
            "quantity": quantity,
            "idempotencyKey": key,
        })
    }

    #[tokio::test]
    async fn lifecycle_over_the_envelope() {
        let service = service_with(MemoryStore::new(), 2);

        let generated = call(&service, generate("g1", 2)).await;
        let records = generated["ok"]["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "11000154102");
        assert_eq!(records[0]["status"], "RESERVED");
        assert_eq!(records[0]["requestorId"], "alice");

        let registered = call(
            &service,
            json!({
                "credential": "other",
                "op": "register",
                "ids": ["11000154102"],
                "comment": "import run",
                "idempotencyKey": "r1",
            }),
        )
        .await;
        let outcome = &registered["ok"]["outcomes"][0];
        assert_eq!(outcome["outcome"], "applied");
        assert_eq!(outcome["newStatus"], "ASSIGNED");
        assert_eq!(outcome["record"]["requestorId"], "bob");

        let released = call(
            &service,
            json!({
                "credential": "s3cret",
                "op": "release",
                "ids": ["11000154102"],
                "idempotencyKey": "x1",
            }),
        )
        .await;
        assert_eq!(released["ok"]["outcomes"][0]["outcome"], "applied");

        let snapshot = call(
            &service,
            json!({"credential": "s3cret", "op": "bucket", "namespace": 1000154, "category": "CONCEPT"}),
        )
        .await;
        assert_eq!(snapshot["ok"]["watermark"], 2);
        assert_eq!(snapshot["ok"]["freePool"], 1);

        let many = call(
            &service,
            json!({"credential": "s3cret", "op": "lookupMany", "ids": ["11000154102", "21000154106"]}),
        )
        .await;
        assert_eq!(many["ok"][0]["status"], "AVAILABLE");
        assert_eq!(many["ok"][1]["status"], "RESERVED");

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_requests_never_reach_the_engine() {
        let service = service_with(MemoryStore::new(), 1);
        for credential in [json!(null), json!("wrong")] {
            let mut request = generate("g", 1);
            request["credential"] = credential;
            let reply = call(&service, request).await;
            assert_eq!(reply["error"]["kind"], "UNAUTHORIZED");
        }
        let snapshot = call(
            &service,
            json!({"credential": "s3cret", "op": "bucket", "namespace": 1000154, "category": "CONCEPT"}),
        )
        .await;
        assert_eq!(snapshot["ok"]["watermark"], 0);
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn errors_carry_kind_and_ids() {
        let service = service_with(MemoryStore::new(), 1);

        let malformed = call(&service, json!({"credential": "s3cret", "op": "explode"})).await;
        assert_eq!(malformed["error"]["kind"], "BAD_REQUEST");

        let missing = call(
            &service,
            json!({"credential": "s3cret", "op": "lookup", "id": "138875005"}),
        )
        .await;
        assert_eq!(missing["error"]["kind"], "NOT_FOUND");
        assert_eq!(missing["error"]["ids"], json!(["138875005"]));

        let bad_check = call(
            &service,
            json!({"credential": "s3cret", "op": "lookup", "id": "138875006"}),
        )
        .await;
        assert_eq!(bad_check["error"]["kind"], "INVALID_FORMAT");

        let too_many = call(&service, generate("big", 1001)).await;
        assert_eq!(too_many["error"]["kind"], "BAD_REQUEST");

        service.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_the_pool() {
        let service = service_with(MemoryStore::new(), 3);
        let mut tasks = Vec::new();
        for i in 0..12 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                call(&service, generate(&format!("g{i}"), 5)).await
            }));
        }
        let mut ids = Vec::new();
        for task in tasks {
            let reply = task.await.unwrap();
            for record in reply["ok"]["records"].as_array().unwrap() {
                ids.push(record["id"].as_str().unwrap().to_owned());
            }
        }
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(total, 60);
        assert_eq!(ids.len(), 60);
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_refuses_new_requests() {
        let service = service_with(MemoryStore::new(), 2);
        assert_eq!(call(&service, generate("g", 1)).await["ok"]["records"][0]["status"], "RESERVED");

        service.shutdown().await.unwrap();
        assert!(service.is_shutting_down());
        assert!(service.shutdown_token().is_cancelled());

        let reply = call(&service, generate("g2", 1)).await;
        assert_eq!(reply["error"]["kind"], "UNAVAILABLE");
        assert!(reply["error"]["reason"].as_str().unwrap().contains("shutting down"));
    }

    #[tokio::test]
    async fn durable_store_survives_service_restart() {
        let dir = tempfile::tempdir().unwrap();

        let service = service_with(FileStore::open(dir.path()).unwrap(), 2);
        let first = call(&service, generate("g1", 3)).await;
        assert_eq!(first["ok"]["records"][2]["id"], "31000154108");
        service.shutdown().await.unwrap();
        drop(service);

        let service = service_with(FileStore::open(dir.path()).unwrap(), 2);
        let lookup = call(
            &service,
            json!({"credential": "s3cret", "op": "lookup", "id": "31000154108"}),
        )
        .await;
        assert_eq!(lookup["ok"]["status"], "RESERVED");
        let next = call(&service, generate("g2", 1)).await;
        assert_eq!(next["ok"]["records"][0]["id"], "41000154101");
        service.shutdown().await.unwrap();
    }
}
