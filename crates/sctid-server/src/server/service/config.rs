use core::time::Duration;

/// Runtime knobs of the request front end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Number of worker tasks. Each runs at most one coordinator call at a
    /// time.
    pub num_workers: usize,
    /// Longest accepted request line, newline excluded.
    pub max_line_bytes: usize,
    /// How long shutdown waits for in-flight requests before cancelling them.
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            max_line_bytes: 1 << 20,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}
