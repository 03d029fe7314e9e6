//! Utility functions

pub mod logger;
pub mod sync;

pub use logger::{init_logging, Logger};
