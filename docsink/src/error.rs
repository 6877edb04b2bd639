//! Error types and result definitions for sink operations.
//!
//! [`SinkError`] carries an [`ErrorKind`] classification, a static description, optional dynamic
//! detail, an optional source and the callsite where it was created.
//!
//! Only session-level faults travel as [`SinkError`]. Per-event failures are data and are
//! reported through [`crate::report::ErrorReporter`] instead.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use docsink_config::shared::ValidationError;

use crate::store::{StoreError, StoreErrorCode};

/// Convenient result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the sink.
#[derive(Debug, Clone)]
pub struct SinkError {
    payload: Box<ErrorPayload>,
}

/// Categories of errors raised by the sink.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    DestinationConnectionFailed,

    // Query & Execution Errors
    DestinationQueryFailed,
    DestinationResetFailed,
    DestinationTableMissing,

    // Data Errors
    ValidationError,

    // Configuration Errors
    ConfigError,

    // State & Workflow Errors
    InvalidState,
    SinkWorkerPanic,
    SinkWorkerCancelled,

    // General Errors
    Unknown,
}

impl SinkError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description.
    pub fn description(&self) -> &str {
        self.payload.description.as_ref()
    }

    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the backtrace captured when the error was created.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SinkError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for SinkError {
    fn eq(&self, other: &SinkError) -> bool {
        self.kind() == other.kind()
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        write_detail(payload.detail.as_deref(), f)?;
        write_backtrace(payload.backtrace.as_ref(), f)
    }
}

impl error::Error for SinkError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source as &(dyn error::Error + 'static))
    }
}

fn write_backtrace(backtrace: &Backtrace, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if backtrace.status() != BacktraceStatus::Captured {
        return Ok(());
    }

    let rendered = backtrace.to_string();

    write!(f, "\n  Backtrace:")?;
    for line in rendered.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    if detail.trim().is_empty() {
        return write!(f, "\n  Detail: <empty>");
    }

    write!(f, "\n  Detail:")?;
    for line in detail.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for SinkError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SinkError {
        SinkError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for SinkError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SinkError {
        SinkError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<ValidationError> for SinkError {
    #[track_caller]
    fn from(err: ValidationError) -> SinkError {
        let detail = err.to_string();
        SinkError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Sink configuration is invalid"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps a store error by its structured code, falling back to a generic query failure.
impl From<StoreError> for SinkError {
    #[track_caller]
    fn from(err: StoreError) -> SinkError {
        let (kind, description) = match err.code() {
            Some(StoreErrorCode::TableMissing) => {
                (ErrorKind::DestinationTableMissing, "Store collection missing")
            }
            Some(StoreErrorCode::ConnectionFailed) => (
                ErrorKind::DestinationConnectionFailed,
                "Store connection failed",
            ),
            _ => (ErrorKind::DestinationQueryFailed, "Store operation failed"),
        };

        let detail = err.to_string();
        SinkError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::{bail, sink_error};

    #[test]
    fn single_error_renders_kind_description_and_detail() {
        let err = sink_error!(
            ErrorKind::InvalidState,
            "Sink is not listening",
            "adaptor docsink"
        );

        let rendered = err.to_string();
        assert!(rendered.starts_with("[InvalidState] Sink is not listening @ "));
        assert!(rendered.contains("Detail:\n    adaptor docsink"));
        assert_eq!(err.detail(), Some("adaptor docsink"));
        assert_eq!(err.description(), "Sink is not listening");
    }

    #[test]
    fn source_is_exposed() {
        let err = sink_error!(
            ErrorKind::DestinationConnectionFailed,
            "Failed to connect to the document store",
            source: StoreError::new(StoreErrorCode::ConnectionFailed, "connection refused")
        );

        assert_eq!(
            err.source().map(|source| source.to_string()),
            Some("connection refused".to_owned())
        );
        assert_eq!(err.detail(), None);
    }

    #[test]
    fn store_errors_map_by_code() {
        let missing: SinkError =
            StoreError::new(StoreErrorCode::TableMissing, "Table `db.docs` does not exist.").into();
        let conflict: SinkError =
            StoreError::new(StoreErrorCode::DuplicatePrimaryKey, "Duplicate primary key `id`")
                .into();
        let uncoded: SinkError = StoreError::message("connection reset by peer").into();

        assert_eq!(missing.kind(), ErrorKind::DestinationTableMissing);
        assert_eq!(conflict.kind(), ErrorKind::DestinationQueryFailed);
        assert_eq!(uncoded.kind(), ErrorKind::DestinationQueryFailed);
        assert_eq!(uncoded.detail(), Some("connection reset by peer"));
    }

    #[test]
    fn bail_returns_early() {
        fn fails() -> SinkResult<()> {
            bail!(ErrorKind::ValidationError, "Collection name is empty");
        }

        assert_eq!(fails().unwrap_err().kind(), ErrorKind::ValidationError);
    }
}
