//! Worker pool for blocking coordinator calls.
//!
//! [`WorkerPool`] owns one bounded [`mpsc::Sender`] per worker, distributes
//! [`WorkRequest`]s round-robin, and coordinates shutdown through a shared
//! [`CancellationToken`]. Workers never share a channel, so dispatch takes no
//! lock.

use crate::server::{
    error::{Result, ServiceError},
    pool::request::WorkRequest,
    service::handler::Inflight,
};
use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    inflight: Arc<Inflight>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub const fn new(
        workers: Vec<mpsc::Sender<WorkRequest>>,
        inflight: Arc<Inflight>,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            inflight,
            shutdown_token,
            shutdown_timeout,
        }
    }

    /// Returns the index of the next worker to receive work (round-robin).
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// Sends a [`WorkRequest`] to the next worker in the pool, waiting for
    /// it to become free.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::ServiceShutdown`] once shutdown has cancelled work.
    /// - [`ServiceError::ChannelError`] if the worker's channel is closed.
    pub async fn send_to_next_worker(&self, request: WorkRequest) -> Result<()> {
        if self.shutdown_token.is_cancelled() {
            return Err(ServiceError::ServiceShutdown);
        }

        let worker_idx = self.next_worker_index();
        let worker = &self.workers[worker_idx];

        tokio::select! {
            () = self.shutdown_token.cancelled() => Err(ServiceError::ServiceShutdown),
            sent = worker.send(request) => sent.map_err(|_| ServiceError::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            }),
        }
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Refuses new requests.
    /// - Waits up to the configured timeout for in-flight requests to finish.
    /// - Cancels the shared [`CancellationToken`].
    /// - Sends [`WorkRequest::Shutdown`] to each worker and waits up to 3
    ///   seconds per worker for the acknowledgement.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new requests ===
        tracing::info!("Refusing new requests");
        self.inflight.close();

        // === Phase 1: Wait for in-flight requests to drain ===
        tracing::info!(
            "Draining in-flight requests ({} active)",
            self.inflight.count()
        );
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.inflight.count() > 0 {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => tracing::debug!("All in-flight requests drained"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} requests still active)",
                self.inflight.count()
            ),
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        // === Phase 3: Notify workers to shut down ===
        tracing::debug!("Notifying all workers to shut down");
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());

        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                tracing::error!("Failed to send shutdown to worker {i}: {e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        let timeout_futures = shutdown_handles.into_iter().map(|(i, rx)| async move {
            match timeout(Duration::from_secs(3), rx).await {
                Ok(Ok(())) => tracing::trace!("Worker {i} shutdown acknowledged"),
                Ok(Err(e)) => tracing::error!("Worker {i} returned error: {e}"),
                Err(_) => tracing::warn!("Worker {i} shutdown timed out"),
            }
        });

        futures::future::join_all(timeout_futures).await;

        tracing::info!("Worker pool shutdown complete");
        Ok(())
    }
}
