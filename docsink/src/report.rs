use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Severity of an [`AdaptorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Notice,
    Warning,
    Error,
    /// The adaptor cannot continue, e.g. the store is unreachable at startup.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Notice => f.write_str("notice"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
            Severity::Critical => f.write_str("critical"),
        }
    }
}

/// Structured error record pushed onto the error channel.
///
/// Records are data, not control flow: the sink keeps processing events after emitting one. The
/// offending payload is attached so that an operator can replay or discard the event.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{severity} in {path}: {message}")]
pub struct AdaptorError {
    pub severity: Severity,
    /// Identifier of the adaptor instance that emitted the record.
    pub path: String,
    pub message: String,
    pub record: Option<Value>,
}

pub type ErrorTx = mpsc::UnboundedSender<AdaptorError>;

pub type ErrorRx = mpsc::UnboundedReceiver<AdaptorError>;

/// Creates the channel on which adaptors report [`AdaptorError`]s.
pub fn create_error_channel() -> (ErrorTx, ErrorRx) {
    mpsc::unbounded_channel()
}

/// Sending half of the error channel, bound to an adaptor path.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    path: String,
    tx: ErrorTx,
}

impl ErrorReporter {
    pub fn new(path: impl Into<String>, tx: ErrorTx) -> Self {
        Self {
            path: path.into(),
            tx,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Emits a record. A closed channel is logged and otherwise ignored, since there is nobody
    /// left to act on the record.
    pub fn report(&self, severity: Severity, message: impl Into<String>, record: Option<Value>) {
        let error = AdaptorError {
            severity,
            path: self.path.clone(),
            message: message.into(),
            record,
        };

        if let Err(err) = self.tx.send(error) {
            warn!(
                path = %self.path,
                error = %err.0,
                "error channel is closed, dropping error record"
            );
        }
    }

    /// Emits an [`Severity::Error`] record carrying the offending payload.
    pub fn error(&self, message: impl Into<String>, record: Value) {
        self.report(Severity::Error, message, Some(record));
    }

    /// Emits a [`Severity::Critical`] record without a payload.
    pub fn critical(&self, message: impl Into<String>) {
        self.report(Severity::Critical, message, None);
    }
}
