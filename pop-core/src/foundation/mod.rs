//! Foundation layer: shared primitives used by every other layer.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
