//! Concurrency primitives for coordinating the sink worker.
//!
//! The [`shutdown`] module implements a broadcast-based shutdown signal. The sink worker observes
//! it only between events, so the mutation in flight when shutdown is requested always completes
//! before the session is closed.

pub mod shutdown;
