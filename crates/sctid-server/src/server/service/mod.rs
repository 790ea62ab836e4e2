//! Request handling and worker coordination.
//!
//! - [`handler`] - envelope entry point (`SctIdService`).
//! - [`config`] - front-end tunables.

pub mod config;
pub mod handler;
