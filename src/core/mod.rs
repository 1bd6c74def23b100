/// Core Module for dbframe
///
/// Shared infrastructure: the error type and the database access layer
/// that the `Sql` facade drives.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DbFrameError, Result};
