use anyhow::bail;
use docsink::adaptor::SinkAdaptor;
use docsink::report::{AdaptorError, ErrorRx, ErrorTx, Severity, create_error_channel};
use docsink::store::StoreConnector;
use docsink::store::memory::MemoryStore;
use docsink_config::shared::{ReplicatorConfig, SinkConfig};
use docsink_stores::redis::RedisConnector;
use tokio::io::BufReader;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::source::{SourceStats, forward_events};

/// Store driver selected by the scheme of the sink uri.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    Memory,
    Redis,
}

impl StoreKind {
    fn from_scheme(scheme: &str) -> anyhow::Result<Self> {
        match scheme {
            "memory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            other => bail!("unsupported store scheme `{other}`, use `memory` or `redis`"),
        }
    }
}

/// Starts the document sink with the provided configuration.
///
/// Change events are read from stdin until the end of input or a shutdown signal, and every
/// record of the error channel is logged.
pub async fn start_replicator_with_config(
    replicator_config: ReplicatorConfig,
) -> anyhow::Result<()> {
    info!("starting replicator service");

    log_config(&replicator_config);

    let (errors_tx, errors_rx) = create_error_channel();
    let errors_logger = spawn_errors_logger(errors_rx);

    let result = run_sink(&replicator_config, errors_tx).await;

    // All senders are dropped once the sink stopped, so the logger drains and exits.
    join_errors_logger(errors_logger).await;

    result?;

    info!("replicator service completed");

    Ok(())
}

/// Builds the store connector selected by the sink uri and runs the sink with it.
async fn run_sink(config: &ReplicatorConfig, errors_tx: ErrorTx) -> anyhow::Result<()> {
    let sink_config = &config.sink;

    match StoreKind::from_scheme(&sink_config.scheme()?)? {
        StoreKind::Memory => {
            let adaptor = SinkAdaptor::from_config(
                config.path.clone(),
                MemoryStore::new(),
                sink_config,
                errors_tx,
            )?;
            start_sink(adaptor, config).await
        }
        StoreKind::Redis => {
            let connector =
                RedisConnector::new(sink_config.username.clone(), sink_config.password.clone());
            let adaptor =
                SinkAdaptor::from_config(config.path.clone(), connector, sink_config, errors_tx)?;
            start_sink(adaptor, config).await
        }
    }
}

/// Starts a sink fed from stdin and handles graceful shutdown signals.
#[tracing::instrument(skip_all, fields(path = %config.path))]
async fn start_sink<K>(mut adaptor: SinkAdaptor<K>, config: &ReplicatorConfig) -> anyhow::Result<()>
where
    K: StoreConnector,
{
    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);
    adaptor.listen(events_rx).await?;

    let source_handle = tokio::spawn(forward_events(
        BufReader::new(tokio::io::stdin()),
        events_tx,
        adaptor.reporter(),
    ));

    let shutdown_tx = adaptor.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        wait_for_shutdown_signal().await;

        if let Err(e) = shutdown_tx.shutdown() {
            warn!(error = ?e, "failed to send shutdown signal");
            return;
        }

        info!("document sink shutdown requested");
    });

    let result = adaptor.wait().await;

    // Whichever way the sink stopped, neither the signal listener nor the stdin reader is
    // needed anymore.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;
    source_handle.abort();
    log_source_result(source_handle.await);

    let stats = result?;
    info!(
        applied = stats.applied,
        conflicts = stats.conflicts,
        malformed_payloads = stats.malformed_payloads,
        invalid_identifiers = stats.invalid_identifiers,
        store_write_failures = stats.store_write_failures,
        "document sink stopped"
    );

    Ok(())
}

/// Logs how the event source ended, returning `false` for read failures and panics.
fn log_source_result(result: Result<std::io::Result<SourceStats>, JoinError>) -> bool {
    match result {
        Ok(Ok(_)) => true,
        Err(err) if err.is_cancelled() => {
            debug!("event source stopped with the sink");
            true
        }
        Ok(Err(err)) => {
            error!(error = %err, "failed to read change events from stdin");
            false
        }
        Err(err) => {
            error!(error = %err, "event source panicked");
            false
        }
    }
}

async fn wait_for_shutdown_signal() {
    // Sent by orchestrators before killing the process.
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to register sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("sigint (ctrl+c) received, shutting down document sink");
        }
        _ = sigterm => {
            info!("sigterm received, shutting down document sink");
        }
    }
}

/// Waits for the errors logger, returning `false` if it did not complete normally.
async fn join_errors_logger(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, "error channel logger failed");
            false
        }
    }
}

fn spawn_errors_logger(mut errors_rx: ErrorRx) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(record) = errors_rx.recv().await {
            log_error_record(&record);
        }
    })
}

fn log_error_record(record: &AdaptorError) {
    let payload = record
        .record
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_default();

    match record.severity {
        Severity::Critical | Severity::Error => error!(
            severity = %record.severity,
            path = %record.path,
            payload = %payload,
            "{}",
            record.message
        ),
        Severity::Warning => warn!(path = %record.path, payload = %payload, "{}", record.message),
        Severity::Notice => info!(path = %record.path, payload = %payload, "{}", record.message),
    }
}

fn log_config(config: &ReplicatorConfig) {
    debug!(
        path = %config.path,
        channel_capacity = config.channel_capacity,
        "replicator config"
    );
    log_sink_config(&config.sink);
}

fn log_sink_config(config: &SinkConfig) {
    debug!(
        uri = %config.uri,
        namespace = %config.namespace,
        debug = config.debug,
        reset_policy = ?config.reset_policy,
        username = ?config.username,
        "sink config"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kind_is_selected_by_scheme() {
        assert_eq!(StoreKind::from_scheme("memory").unwrap(), StoreKind::Memory);
        assert_eq!(StoreKind::from_scheme("redis").unwrap(), StoreKind::Redis);

        let err = StoreKind::from_scheme("rethinkdb").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported store scheme `rethinkdb`, use `memory` or `redis`"
        );
    }

    #[tokio::test]
    async fn source_read_failures_are_not_swallowed() {
        assert!(log_source_result(Ok(Ok(SourceStats::default()))));
        assert!(!log_source_result(Ok(Err(std::io::Error::other("broken pipe")))));

        let cancelled = tokio::spawn(std::future::pending::<std::io::Result<SourceStats>>());
        cancelled.abort();
        assert!(log_source_result(cancelled.await));

        let panicked = tokio::spawn(async {
            if true {
                panic!("source failed");
            }
            Ok(SourceStats::default())
        });
        assert!(!log_source_result(panicked.await));
    }

    #[tokio::test]
    async fn errors_logger_panics_are_detected() {
        let (errors_tx, errors_rx) = create_error_channel();
        drop(errors_tx);
        assert!(join_errors_logger(spawn_errors_logger(errors_rx)).await);

        let panicked = tokio::spawn(async {
            panic!("logger failed");
        });
        assert!(!join_errors_logger(panicked).await);
    }
}
