mod base;
mod replicator;
mod sink;

pub use base::*;
pub use replicator::*;
pub use sink::*;
