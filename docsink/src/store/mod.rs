//! Document store abstractions.
//!
//! The sink talks to its backing store only through [`StoreConnector`] and [`DocumentStore`].
//! Store drivers report writes as [`WriteAck`]s and transport failures as [`StoreError`]s;
//! interpreting them is left to [`crate::apply`].

mod ack;
mod base;
pub mod memory;

pub use ack::*;
pub use base::*;
