//! Application of change events to a [`Session`].
//!
//! The [`OperationApplier`] maps each [`ChangeEvent`] to exactly one store mutation and turns the
//! store's acknowledgment into a [`WriteOutcome`]. Data errors never abort the stream: they are
//! reported on the error channel and the next event is processed normally.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::report::ErrorReporter;
use crate::session::Session;
use crate::store::{ConflictPolicy, DocumentStore, StoreError, StoreErrorCode, WriteAck};
use crate::types::{ChangeEvent, Operation};

/// Text that identifies a duplicate primary key error reported by a store that exposes no
/// structured error code.
pub const DUPLICATE_PRIMARY_KEY_MARKER: &str = "Duplicate primary key";

/// Prefix of the message of failures that carry a store acknowledgment error.
const STORE_WRITE_FAILURE_PREFIX: &str = "problem inserting docs";

/// Category of an [`ApplyFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyFailureKind {
    /// The payload is not a document. No store call was made.
    MalformedPayload,
    /// A delete event has no usable `id`. No store call was made.
    InvalidIdentifier,
    /// The store call failed or its acknowledgment carried a non-benign error.
    StoreWrite,
}

/// Failure to apply a change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub kind: ApplyFailureKind,
    pub message: String,
}

impl ApplyFailure {
    fn new(kind: ApplyFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Normalized result of applying one change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The store accepted the mutation.
    Applied(WriteAck),
    /// The store rejected an insert because the primary key exists. Expected under at-least-once
    /// delivery, so it counts as a success and is not reported.
    Conflict(StoreError),
    Failed(ApplyFailure),
}

impl WriteOutcome {
    /// Returns `true` for [`WriteOutcome::Applied`] and [`WriteOutcome::Conflict`].
    pub fn is_success(&self) -> bool {
        !matches!(self, WriteOutcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&ApplyFailure> {
        match self {
            WriteOutcome::Failed(failure) => Some(failure),
            WriteOutcome::Applied(_) | WriteOutcome::Conflict(_) => None,
        }
    }
}

/// Decides whether a store error is a benign write conflict.
pub trait ConflictClassifier {
    fn is_conflict(&self, error: &StoreError) -> bool;
}

/// Classifies duplicate primary key errors as conflicts.
///
/// Uses the structured [`StoreErrorCode::DuplicatePrimaryKey`] when the store provides a code,
/// and otherwise looks for [`DUPLICATE_PRIMARY_KEY_MARKER`] in the error text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateKeyClassifier;

impl ConflictClassifier for DuplicateKeyClassifier {
    fn is_conflict(&self, error: &StoreError) -> bool {
        match error.code() {
            Some(code) => code == StoreErrorCode::DuplicatePrimaryKey,
            None => error.text().contains(DUPLICATE_PRIMARY_KEY_MARKER),
        }
    }
}

/// Applies change events to a session and reports failures.
#[derive(Clone)]
pub struct OperationApplier {
    reporter: ErrorReporter,
    classifier: Arc<dyn ConflictClassifier + Send + Sync>,
}

impl fmt::Debug for OperationApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationApplier")
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl OperationApplier {
    /// Creates an applier that uses the [`DuplicateKeyClassifier`].
    pub fn new(reporter: ErrorReporter) -> Self {
        Self::with_classifier(reporter, DuplicateKeyClassifier)
    }

    pub fn with_classifier<K>(reporter: ErrorReporter, classifier: K) -> Self
    where
        K: ConflictClassifier + Send + Sync + 'static,
    {
        Self {
            reporter,
            classifier: Arc::new(classifier),
        }
    }

    /// Applies one event to the session's collection.
    ///
    /// Every failure is reported on the error channel before being returned, so callers may
    /// ignore the outcome.
    pub async fn apply<C>(&self, session: &Session<C>, event: &ChangeEvent) -> WriteOutcome
    where
        C: DocumentStore,
    {
        let outcome = self.execute(session, event).await;

        if let WriteOutcome::Failed(failure) = &outcome {
            self.reporter.error(
                format!("{} error ({})", C::name(), failure.message),
                event.data.clone(),
            );
        }

        outcome
    }

    async fn execute<C>(&self, session: &Session<C>, event: &ChangeEvent) -> WriteOutcome
    where
        C: DocumentStore,
    {
        let Some(document) = event.document() else {
            return WriteOutcome::Failed(ApplyFailure::new(
                ApplyFailureKind::MalformedPayload,
                "document must be a json document",
            ));
        };

        let result = match event.op {
            Operation::Delete => {
                let Some(id) = event.primary_key() else {
                    return WriteOutcome::Failed(ApplyFailure::new(
                        ApplyFailureKind::InvalidIdentifier,
                        "cannot delete an object with a nil id",
                    ));
                };

                session.delete(&id).await
            }
            Operation::Insert => session.insert(document, ConflictPolicy::Error).await,
            Operation::Update => session.insert(document, ConflictPolicy::Replace).await,
        };

        match result {
            Ok(ack) => self.interpret(session.debug(), ack),
            Err(err) => WriteOutcome::Failed(ApplyFailure::new(
                ApplyFailureKind::StoreWrite,
                err.to_string(),
            )),
        }
    }

    /// Turns an acknowledgment into an outcome, suppressing conflicts.
    pub fn interpret(&self, debug: bool, ack: WriteAck) -> WriteOutcome {
        if !ack.has_errors() {
            return WriteOutcome::Applied(ack);
        }

        let errors = ack.errors;
        let error = match ack.into_result() {
            Ok(ack) => return WriteOutcome::Applied(ack),
            Err(error) => error,
        };

        if self.classifier.is_conflict(&error) {
            debug!(error = %error, "suppressed write conflict");
            return WriteOutcome::Conflict(error);
        }

        if debug {
            info!(errors, "store reported write errors");
        }

        WriteOutcome::Failed(ApplyFailure::new(
            ApplyFailureKind::StoreWrite,
            format!("{STORE_WRITE_FAILURE_PREFIX}\n{error}"),
        ))
    }
}
