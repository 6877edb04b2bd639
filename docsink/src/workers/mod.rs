//! Background workers of the sink.

pub mod sink;
