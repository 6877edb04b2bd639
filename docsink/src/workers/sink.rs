use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, info};

use crate::apply::{ApplyFailureKind, OperationApplier, WriteOutcome};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, SinkResult};
use crate::session::Session;
use crate::sink_error;
use crate::store::DocumentStore;
use crate::types::ChangeEvent;

/// Counters of the outcomes produced by a sink worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub applied: u64,
    pub conflicts: u64,
    pub malformed_payloads: u64,
    pub invalid_identifiers: u64,
    pub store_write_failures: u64,
}

impl ApplyStats {
    pub fn record(&mut self, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::Applied(_) => self.applied += 1,
            WriteOutcome::Conflict(_) => self.conflicts += 1,
            WriteOutcome::Failed(failure) => match failure.kind {
                ApplyFailureKind::MalformedPayload => self.malformed_payloads += 1,
                ApplyFailureKind::InvalidIdentifier => self.invalid_identifiers += 1,
                ApplyFailureKind::StoreWrite => self.store_write_failures += 1,
            },
        }
    }

    /// Total number of events handled.
    pub fn handled(&self) -> u64 {
        self.applied + self.conflicts + self.failed()
    }

    pub fn failed(&self) -> u64 {
        self.malformed_payloads + self.invalid_identifiers + self.store_write_failures
    }
}

/// Handle of a running [`SinkWorker`].
#[derive(Debug)]
pub struct SinkWorkerHandle {
    handle: Option<JoinHandle<SinkResult<ApplyStats>>>,
}

impl SinkWorkerHandle {
    /// Waits for the worker to finish and returns the stats of its run.
    ///
    /// Panics and cancellations of the worker task are turned into errors.
    pub async fn wait(mut self) -> SinkResult<ApplyStats> {
        let Some(handle) = self.handle.take() else {
            return Ok(ApplyStats::default());
        };

        let stats = handle.await.map_err(|err| {
            if err.is_cancelled() {
                sink_error!(
                    ErrorKind::SinkWorkerCancelled,
                    "Sink worker was cancelled",
                    err
                )
            } else {
                sink_error!(ErrorKind::SinkWorkerPanic, "Sink worker panicked", err)
            }
        })??;

        Ok(stats)
    }
}

/// Worker that applies the inbound events to a session, one at a time and in delivery order.
///
/// The worker stops when shutdown is requested or when the inbound channel is closed. Shutdown
/// is only observed between events, so the event being applied always completes. The session is
/// closed when the worker stops.
#[derive(Debug)]
pub struct SinkWorker<C> {
    path: String,
    session: Session<C>,
    applier: OperationApplier,
    events_rx: mpsc::Receiver<ChangeEvent>,
    shutdown_rx: ShutdownRx,
}

impl<C> SinkWorker<C>
where
    C: DocumentStore + Send + Sync + 'static,
{
    pub fn new(
        path: impl Into<String>,
        session: Session<C>,
        applier: OperationApplier,
        events_rx: mpsc::Receiver<ChangeEvent>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            path: path.into(),
            session,
            applier,
            events_rx,
            shutdown_rx,
        }
    }

    pub fn spawn(self) -> SinkWorkerHandle {
        info!("starting sink worker");

        let sink_worker_span = tracing::info_span!(
            "sink_worker",
            path = %self.path,
            database = %self.session.database(),
            collection = %self.session.collection(),
        );

        let handle = tokio::spawn(self.run().instrument(sink_worker_span.or_current()));

        SinkWorkerHandle {
            handle: Some(handle),
        }
    }

    async fn run(mut self) -> SinkResult<ApplyStats> {
        let mut stats = ApplyStats::default();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    info!("shutting down sink worker");
                    break;
                }

                event = self.events_rx.recv() => {
                    let Some(event) = event else {
                        info!("event source closed, stopping sink worker");
                        break;
                    };

                    let outcome = self.applier.apply(&self.session, &event).await;
                    stats.record(&outcome);
                }
            }
        }

        self.session.close().await?;

        info!(
            applied = stats.applied,
            conflicts = stats.conflicts,
            failed = stats.failed(),
            "sink worker completed"
        );

        Ok(stats)
    }
}
