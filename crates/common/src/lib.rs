//! Shared types for the Threads session gateway crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
