use crate::RecyclePolicy;
use std::time::Duration;

/// Tunables of a [`Coordinator`](crate::Coordinator).
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinatorConfig {
    /// Largest quantity or id list a single request may carry.
    pub max_batch_size: usize,
    /// How long a request may wait for its bucket lock.
    pub lock_timeout: Duration,
    /// How long a completed request's outcome is replayable.
    pub idempotency_ttl: Duration,
    /// Upper bound on cached outcomes.
    pub idempotency_capacity: usize,
    pub retry: RetryPolicy,
    pub recycle: RecyclePolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            lock_timeout: Duration::from_secs(5),
            idempotency_ttl: Duration::from_secs(300),
            idempotency_capacity: 10_000,
            retry: RetryPolicy::default(),
            recycle: RecyclePolicy::Reuse,
        }
    }
}

/// Bounded exponential backoff for transient store failures.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(250),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}
