//! Round-robin pool of workers running coordinator calls.
//!
//! - [`manager`] - dispatch and graceful shutdown (`WorkerPool`).
//! - [`worker`] - per-worker receive loop.
//! - [`request`] - messages sent to workers.

pub mod manager;
pub mod request;
pub mod worker;
