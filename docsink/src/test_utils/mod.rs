//! Utilities for testing the document sink.
//!
//! - [`counting_store`] wraps a [`crate::store::memory::MemoryStore`] to record every store call
//!   and inject failures.
//! - [`event`] builds documents and change events from JSON literals.
//! - [`errors`] collects the records emitted on the error channel.

pub mod counting_store;
pub mod errors;
pub mod event;
