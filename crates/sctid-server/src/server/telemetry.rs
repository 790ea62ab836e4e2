//! Log output for the server process.
//!
//! Everything goes through `tracing`. The filter is read from `RUST_LOG` and
//! defaults to `info`. Audit events from the engine are emitted under the
//! `sctid::audit` target, so `RUST_LOG=info,sctid::audit=off` silences them.

use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::ChronoLocal, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Output encoding of log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human readable.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let (pretty, json) = match format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_timer(ChronoLocal::rfc_3339())
                    .with_file(true)
                    .pretty(),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_timer(ChronoLocal::rfc_3339())
                    .with_file(true)
                    .json(),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()?;

    Ok(())
}
