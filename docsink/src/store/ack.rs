use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Structured classification of a store error, when the driver exposes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorCode {
    /// A document with the same primary key already exists.
    DuplicatePrimaryKey,
    /// The document's primary key has an unsupported type.
    InvalidPrimaryKey,
    /// The addressed collection does not exist.
    TableMissing,
    /// The collection to create already exists.
    TableAlreadyExists,
    /// The store could not be reached or the connection was lost.
    ConnectionFailed,
}

/// Error reported by a store driver.
///
/// Either returned directly from a store call, for failures of the call itself, or carried as
/// the representative error of a [`WriteAck`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreError {
    code: Option<StoreErrorCode>,
    message: String,
}

impl StoreError {
    /// Creates an error with a structured code.
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Creates an error for drivers that only report message text.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<StoreErrorCode> {
        self.code
    }

    pub fn text(&self) -> &str {
        &self.message
    }
}

/// Behavior of an insert when a document with the same primary key exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Reject the document and report a duplicate primary key error.
    Error,
    /// Fully replace the stored document.
    Replace,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Error => f.write_str("error"),
            ConflictPolicy::Replace => f.write_str("replace"),
        }
    }
}

/// Acknowledgment of a write as reported by the store.
///
/// A write call that reached the store always produces an acknowledgment, even when the write
/// itself failed: `errors` counts the rejected documents and `first_error` holds a
/// representative error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteAck {
    pub inserted: u64,
    pub replaced: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub skipped: u64,
    pub errors: u64,
    pub first_error: Option<StoreError>,
    /// Primary keys generated by the store for documents inserted without one.
    pub generated_keys: Vec<String>,
}

impl WriteAck {
    /// Acknowledgment of a single rejected document.
    pub fn rejected(error: StoreError) -> Self {
        Self {
            errors: 1,
            first_error: Some(error),
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Turns an acknowledgment carrying errors into its representative error.
    pub fn into_result(self) -> Result<WriteAck, StoreError> {
        if !self.has_errors() {
            return Ok(self);
        }

        let errors = self.errors;
        Err(self.first_error.unwrap_or_else(|| {
            StoreError::message(format!("{errors} errors reported without a message"))
        }))
    }
}

/// Connection parameters handed to a [`crate::store::StoreConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// `host:port` of the store.
    pub address: String,
    /// Maximum number of idle pooled connections.
    pub max_idle_connections: usize,
    /// Time after which an idle pooled connection is closed.
    pub idle_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_without_errors_is_ok() {
        let ack = WriteAck {
            inserted: 1,
            ..Default::default()
        };

        assert_eq!(ack.clone().into_result(), Ok(ack));
    }

    #[test]
    fn ack_with_errors_yields_first_error() {
        let error = StoreError::new(StoreErrorCode::TableAlreadyExists, "Table exists");

        assert_eq!(WriteAck::rejected(error.clone()).into_result(), Err(error));
    }

    #[test]
    fn ack_with_errors_but_no_message_is_still_an_error() {
        let ack = WriteAck {
            errors: 2,
            ..Default::default()
        };

        let err = ack.into_result().unwrap_err();
        assert_eq!(err.code(), None);
        assert_eq!(err.text(), "2 errors reported without a message");
    }
}
