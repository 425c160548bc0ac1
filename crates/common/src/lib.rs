//! Common utilities and types shared across the APC election components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
