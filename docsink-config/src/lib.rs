//! Configuration for the document sink.
//!
//! Provides the layered configuration loader shared by every binary in the workspace and the
//! shared configuration types describing the sink target.

// The `config` crate is imported under a different name to avoid clashing with this crate's
// [`Config`] trait.
extern crate rust_cli_config as config;

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
