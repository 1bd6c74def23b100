// Core infrastructure modules
pub mod config;
pub mod core;

// Feature modules
pub mod dsn;
pub mod frame;
pub mod sql;

pub use crate::core::db::{ConnectOptions, Credentials, DbSystem, QueryOutcome};
pub use crate::core::{DbFrameError, Result};
pub use crate::dsn::{DsnEntry, DsnRegistry, OdbcPaths};
pub use crate::frame::{ExportFormat, Frame, Record, Value};
pub use crate::sql::{IfExists, OutputFormat, Sql, TableData, WriteOptions};

#[cfg(test)]
mod test_utils;
