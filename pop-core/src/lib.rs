// Public crate surface is organized by layer: `domain`, `crypto`, `foundation`, `infrastructure`.
pub mod crypto;
pub mod domain;
pub mod foundation;
pub mod infrastructure;

pub use foundation::{PopError, Result};
