//! Command-line and environment configuration.
//!
//! Every flag has an environment fallback, and a `.env` file in the working
//! directory is loaded before parsing. [`CliArgs`] is the raw input;
//! [`ServerConfig`] is the validated result.

use crate::server::{service::config::ServiceConfig, telemetry::LogFormat};
use anyhow::ensure;
use clap::Parser;
use core::time::Duration;
use sctid::{CoordinatorConfig, RecyclePolicy, RetryPolicy, StaticTokenAuthorizer};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "SCTID allocation and lifecycle server")]
pub struct CliArgs {
    /// `host:port` to listen on, or a socket path when `--uds` is set.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4815")]
    pub server_addr: String,

    /// Listen on a Unix domain socket instead of TCP.
    #[arg(long, env = "UDS")]
    pub uds: bool,

    /// Directory holding the record journal.
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Worker tasks running coordinator calls. Defaults to the CPU count.
    #[arg(long, env = "NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Largest quantity or id list per request.
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 1000)]
    pub max_batch_size: usize,

    /// How long a request waits for its bucket lock.
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value_t = 5000)]
    pub lock_timeout_ms: u64,

    #[arg(long, env = "IDEMPOTENCY_TTL_SECS", default_value_t = 300)]
    pub idempotency_ttl_secs: u64,

    #[arg(long, env = "IDEMPOTENCY_CAPACITY", default_value_t = 10_000)]
    pub idempotency_capacity: usize,

    /// Attempts per store call, including the first.
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub retry_max_attempts: u32,

    /// `reuse` hands released sequences out again; `retire` never does.
    #[arg(long, env = "RECYCLE_POLICY", default_value = "reuse")]
    pub recycle_policy: RecyclePolicy,

    /// Comma-separated `token=principal` pairs.
    #[arg(long, env = "AUTH_TOKENS", hide_env_values = true)]
    pub auth_tokens: String,

    #[arg(long, env = "MAX_LINE_BYTES", default_value_t = 1 << 20)]
    pub max_line_bytes: usize,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub data_dir: PathBuf,
    pub coordinator: CoordinatorConfig,
    pub service: ServiceConfig,
    pub authorizer: StaticTokenAuthorizer,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let num_workers = args.num_workers.unwrap_or_else(num_cpus::get);
        ensure!(num_workers > 0, "NUM_WORKERS must be at least 1");
        ensure!(args.max_batch_size > 0, "MAX_BATCH_SIZE must be at least 1");
        ensure!(args.lock_timeout_ms > 0, "LOCK_TIMEOUT_MS must be positive");
        ensure!(
            args.retry_max_attempts > 0,
            "RETRY_MAX_ATTEMPTS must be at least 1"
        );
        ensure!(
            args.max_line_bytes >= 64,
            "MAX_LINE_BYTES must be at least 64"
        );

        let authorizer = StaticTokenAuthorizer::parse(&args.auth_tokens)?;
        ensure!(
            !authorizer.is_empty(),
            "AUTH_TOKENS must name at least one token"
        );

        let coordinator = CoordinatorConfig {
            max_batch_size: args.max_batch_size,
            lock_timeout: Duration::from_millis(args.lock_timeout_ms),
            idempotency_ttl: Duration::from_secs(args.idempotency_ttl_secs),
            idempotency_capacity: args.idempotency_capacity,
            retry: RetryPolicy {
                max_attempts: args.retry_max_attempts,
                ..RetryPolicy::default()
            },
            recycle: args.recycle_policy,
        };

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            data_dir: args.data_dir,
            coordinator,
            service: ServiceConfig {
                num_workers,
                max_line_bytes: args.max_line_bytes,
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            },
            authorizer,
            log_format: args.log_format,
        })
    }
}
