use docsink_config::shared::SinkConfig;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::apply::OperationApplier;
use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, SinkError, SinkResult};
use crate::report::{ErrorReporter, ErrorTx};
use crate::session::{Session, SessionOptions};
use crate::store::StoreConnector;
use crate::types::ChangeEvent;
use crate::workers::sink::{ApplyStats, SinkWorker, SinkWorkerHandle};

#[derive(Debug)]
enum AdaptorState {
    NotStarted,
    Started { worker: SinkWorkerHandle },
}

/// Sink adaptor writing a stream of change events into one collection of a document store.
///
/// [`SinkAdaptor::listen`] opens the session (emptying the target collection) and spawns the
/// sink worker; [`SinkAdaptor::wait`] waits for the worker to drain the stream. The adaptor
/// cannot act as a source.
#[derive(Debug)]
pub struct SinkAdaptor<K> {
    path: String,
    connector: K,
    options: SessionOptions,
    reporter: ErrorReporter,
    state: AdaptorState,
    shutdown_tx: ShutdownTx,
}

impl<K> SinkAdaptor<K>
where
    K: StoreConnector,
{
    pub fn new(
        path: impl Into<String>,
        connector: K,
        options: SessionOptions,
        errors_tx: ErrorTx,
    ) -> Self {
        let path = path.into();
        // Receivers are created on demand with `subscribe`.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            reporter: ErrorReporter::new(path.clone(), errors_tx),
            path,
            connector,
            options,
            state: AdaptorState::NotStarted,
            shutdown_tx,
        }
    }

    /// Creates an adaptor from a validated sink configuration.
    pub fn from_config(
        path: impl Into<String>,
        connector: K,
        config: &SinkConfig,
        errors_tx: ErrorTx,
    ) -> SinkResult<Self> {
        let options = SessionOptions::from_config(config)?;

        Ok(Self::new(path, connector, options, errors_tx))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Returns a reporter bound to the error channel of this adaptor.
    pub fn reporter(&self) -> ErrorReporter {
        self.reporter.clone()
    }

    /// Always fails: a document sink only consumes events.
    pub fn start_source(&self) -> SinkResult<()> {
        bail!(
            ErrorKind::InvalidState,
            "Adaptor cannot be started as a source",
            "document sink can't function as a source"
        );
    }

    /// Opens the session and starts applying the events received on `events_rx`.
    ///
    /// Opening the session empties the target collection. A failure to open it is also reported
    /// on the error channel with [`crate::report::Severity::Critical`].
    pub async fn listen(&mut self, events_rx: mpsc::Receiver<ChangeEvent>) -> SinkResult<()> {
        if let AdaptorState::Started { .. } = self.state {
            bail!(
                ErrorKind::InvalidState,
                "Adaptor is already listening",
                format!("The adaptor `{}` was already started", self.path)
            );
        }

        info!(
            path = %self.path,
            database = %self.options.database,
            collection = %self.options.collection,
            "starting document sink"
        );

        let session = match Session::open(&self.connector, self.options.clone()).await {
            Ok(session) => session,
            Err(err) => {
                self.reporter.critical(critical_message(&err));
                return Err(err);
            }
        };

        let applier = OperationApplier::new(self.reporter.clone());
        let worker = SinkWorker::new(
            self.path.clone(),
            session,
            applier,
            events_rx,
            self.shutdown_tx.subscribe(),
        )
        .spawn();

        self.state = AdaptorState::Started { worker };

        Ok(())
    }

    /// Waits for the sink worker to stop and returns the stats of its run.
    pub async fn wait(self) -> SinkResult<ApplyStats> {
        let AdaptorState::Started { worker } = self.state else {
            info!("document sink was not started, nothing to wait for");

            return Ok(ApplyStats::default());
        };

        info!("waiting for sink worker to complete");

        worker.wait().await
    }

    /// Requests the sink worker to stop after the event it is applying.
    ///
    /// Returns `false` when no worker is running, either because the adaptor was never started
    /// or because the worker already exited.
    pub fn stop(&self) -> bool {
        info!("trying to stop the document sink");

        if self.shutdown_tx.shutdown().is_err() {
            debug!("sink worker is not running, no shutdown signal sent");
            return false;
        }

        info!("shutdown signal successfully sent to the sink worker");
        true
    }

    pub async fn shutdown_and_wait(self) -> SinkResult<ApplyStats> {
        self.stop();
        self.wait().await
    }
}

fn critical_message(err: &SinkError) -> String {
    let description = err.description();

    match (err.kind(), err.detail()) {
        (ErrorKind::DestinationConnectionFailed, Some(detail)) => {
            format!("unable to connect: {detail}")
        }
        (_, Some(detail)) => format!("{description}: {detail}"),
        (_, None) => description.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::create_error_channel;
    use crate::store::memory::MemoryStore;

    fn adaptor(errors_tx: ErrorTx) -> SinkAdaptor<MemoryStore> {
        SinkAdaptor::new(
            "docsink",
            MemoryStore::new(),
            SessionOptions::new("localhost:28015", "db", "docs"),
            errors_tx,
        )
    }

    #[test]
    fn adaptor_cannot_be_a_source() {
        let (errors_tx, _errors_rx) = create_error_channel();

        let err = adaptor(errors_tx).start_source().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.detail(), Some("document sink can't function as a source"));
    }

    #[tokio::test]
    async fn waiting_on_unstarted_adaptor_is_a_noop() {
        let (errors_tx, _errors_rx) = create_error_channel();

        let stats = adaptor(errors_tx).wait().await.unwrap();

        assert_eq!(stats, ApplyStats::default());
    }

    #[tokio::test]
    async fn listening_twice_is_rejected() {
        let (errors_tx, _errors_rx) = create_error_channel();
        let mut adaptor = adaptor(errors_tx);
        let (_first_tx, first_rx) = mpsc::channel(1);
        let (_second_tx, second_rx) = mpsc::channel(1);

        adaptor.listen(first_rx).await.unwrap();
        let err = adaptor.listen(second_rx).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        adaptor.shutdown_and_wait().await.unwrap();
    }

    #[tokio::test]
    async fn stop_reports_whether_a_worker_was_signalled() {
        let (errors_tx, _errors_rx) = create_error_channel();
        let mut adaptor = adaptor(errors_tx);

        assert!(!adaptor.stop());

        let (_events_tx, events_rx) = mpsc::channel(1);
        adaptor.listen(events_rx).await.unwrap();

        assert!(adaptor.stop());
        adaptor.wait().await.unwrap();
    }

    #[test]
    fn invalid_namespace_is_rejected_by_from_config() {
        let (errors_tx, _errors_rx) = create_error_channel();
        let config = SinkConfig::new("memory://localhost", "nodot");

        let err = SinkAdaptor::from_config("docsink", MemoryStore::new(), &config, errors_tx)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
