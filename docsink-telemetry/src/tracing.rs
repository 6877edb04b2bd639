//! Tracing subscriber initialization.
//!
//! Logs are written through a non-blocking writer. The returned [`LogFlusher`] must be held for
//! the lifetime of the process, dropping it flushes buffered log lines.

use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Guard that flushes pending log lines when dropped.
pub type LogFlusher = WorkerGuard;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the global tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

static INIT_TEST_TRACING: Once = Once::new();

/// Installs the global subscriber for a binary.
///
/// The filter is read from `RUST_LOG`. Without it, the binary's own target logs at `info`, or at
/// `debug` when `debug` is set, and every other target logs at `warn`.
pub fn init_tracing(app_name: &str, debug: bool) -> Result<LogFlusher, TracingError> {
    let (writer, flusher) = tracing_appender::non_blocking(std::io::stdout());

    let level = if debug { "debug" } else { "info" };
    let target = app_name.replace('-', "_");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{target}={level},docsink={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .try_init()?;

    Ok(flusher)
}

/// Installs a subscriber that writes through the test harness capture.
///
/// Safe to call from every test, only the first call installs the subscriber. Set `RUST_LOG`
/// to see output.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));

        // Another test harness may already have installed a subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
