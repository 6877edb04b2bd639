//! Document sink replicator binary.
//!
//! Reads newline-delimited JSON change events from stdin and applies them to the configured
//! document store until the end of input or a shutdown signal.

use crate::config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

use docsink_config::shared::ReplicatorConfig;
use docsink_telemetry::tracing::init_tracing;
use tracing::error;

mod config;
mod core;
mod error;
mod source;

/// Entry point for the replicator service.
///
/// Loads configuration, initializes tracing, then runs the sink on a multi-threaded runtime.
fn main() -> ReplicatorResult<()> {
    let replicator_config = load_replicator_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), replicator_config.sink.debug)
        .map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(replicator_config))?;

    Ok(())
}

async fn async_main(replicator_config: ReplicatorConfig) -> ReplicatorResult<()> {
    if let Err(err) = start_replicator_with_config(replicator_config).await {
        let err = ReplicatorError::from(err);
        error!("{err}");

        return Err(err);
    }

    Ok(())
}
