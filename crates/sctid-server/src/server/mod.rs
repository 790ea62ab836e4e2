pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod service;
pub mod telemetry;
