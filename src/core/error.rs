/// dbframe Error Module
///
/// This module defines the error type shared by the DSN registry and the
/// query facade. Driver errors are carried through unmodified; the other
/// variants describe conditions the facade itself detects.
use std::path::PathBuf;
use thiserror::Error;

/// Error type for every fallible dbframe operation.
///
/// Covers:
/// - Driver errors from SQLite and ODBC, passed through as-is
/// - Connection failures and table existence conditions
/// - DSN registry and configuration file problems
/// - Frame shape errors and invalid arguments
#[derive(Error, Debug)]
pub enum DbFrameError {
    /// Errors raised by SQLite while executing statements
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Errors raised by the ODBC driver manager or driver
    #[cfg(feature = "mssql")]
    #[error("ODBC error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// The connection could not be opened
    #[error("Connection error: could not connect to {target}: {reason}")]
    Connection { target: String, reason: String },

    /// The named table is not present in the database
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The named table already exists and the write policy is `fail`
    #[error("Table {0} already exists")]
    TableExists(String),

    /// A DSN with this name is already registered
    #[error("DSN {0} already exists in the ODBC configuration")]
    DsnExists(String),

    /// DSN name or stanza value that cannot be written to an INI file
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    /// The ODBC configuration file has not been created yet
    #[error("ODBC configuration not found at {}; call create_config first", .0.display())]
    ConfigMissing(PathBuf),

    /// Settings file loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing and serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame shape errors (ragged rows, missing columns, no columns)
    #[error("Frame error: {0}")]
    Frame(String),

    /// An argument outside its accepted set of values
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A capability that was not compiled in
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// DSN file management is only implemented for Unix-like systems
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl From<toml::de::Error> for DbFrameError {
    fn from(err: toml::de::Error) -> Self {
        DbFrameError::Config(err.to_string())
    }
}

/// Type alias for Result to use DbFrameError as the error type.
pub type Result<T> = std::result::Result<T, DbFrameError>;
