//! Document sink: applies a stream of insert, update and delete change events to one collection
//! of a document store.
//!
//! A [`session::Session`] connects to the store and resets the target collection. The
//! [`apply::OperationApplier`] maps each [`types::ChangeEvent`] to a store mutation and
//! normalizes the acknowledgment into an [`apply::WriteOutcome`], suppressing duplicate primary
//! key conflicts. The [`adaptor::SinkAdaptor`] wires both into a worker fed by a channel and
//! reports failures on an error channel as [`report::AdaptorError`] records.
//!
//! Stores plug in through the [`store::StoreConnector`] and [`store::DocumentStore`] traits. An
//! in-memory implementation lives in [`store::memory`].

pub mod adaptor;
pub mod apply;
pub mod concurrency;
pub mod error;
mod macros;
pub mod report;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
