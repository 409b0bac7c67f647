//! Type definitions for the storage policy model

mod bucket;
mod key;
mod lifecycle;
mod project;
mod registry;

pub use bucket::*;
pub use key::*;
pub use lifecycle::*;
pub use project::*;
pub use registry::*;
