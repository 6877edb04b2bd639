//! Document store drivers for the document sink.
//!
//! Each driver lives behind its own feature flag.

#[cfg(feature = "redis")]
pub mod redis;
