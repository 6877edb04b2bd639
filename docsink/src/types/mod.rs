//! Core data types flowing through the sink.

mod event;

pub use event::*;
