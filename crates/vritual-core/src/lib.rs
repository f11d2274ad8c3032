//! Vritual Core - symbolic memory model and error handling

pub mod error;
pub mod timefmt;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
