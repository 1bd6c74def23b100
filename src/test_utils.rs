/// # Test Utilities Module
///
/// Shared fixtures for dbframe's unit and integration tests:
/// - Temporary SQLite databases opened through the `Sql` facade
/// - Isolated ODBC configuration directories
/// - Sample frames
/// - Error assertion helpers
///
/// Every fixture owns a `TempDir`, so files disappear when the fixture is
/// dropped and tests never share state.

use crate::core::db::{ConnectOptions, DbSystem};
use crate::core::Result;
use crate::dsn::{DsnRegistry, OdbcPaths};
use crate::frame::{Frame, Value};
use crate::sql::Sql;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Once;
use tempfile::TempDir;

static LOGGING: Once = Once::new();

/// Routes `tracing` output through the test harness so it only shows for
/// failing tests.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// A SQLite database file in its own temporary directory
pub struct DatabaseFixture {
    pub dir: TempDir,
    pub path: PathBuf,
    pub sql: Sql,
}

impl DatabaseFixture {
    /// Empty database, reflected on connect
    pub fn new() -> Result<Self> {
        Self::with_options(|options| options)
    }

    /// Empty database connected with customised options
    pub fn with_options(customise: impl FnOnce(ConnectOptions) -> ConnectOptions) -> Result<Self> {
        init_logging();
        let dir = TempDir::new()?;
        let path = dir.path().join("fixture.db");
        let options = customise(ConnectOptions::dsn(DbSystem::Sqlite, path.to_string_lossy()));
        let sql = Sql::connect(options)?;
        Ok(DatabaseFixture { dir, path, sql })
    }

    /// Database holding an `employees` table with the rows of
    /// [`sample_employees`]
    pub fn with_sample_data() -> Result<Self> {
        let mut fixture = Self::new()?;
        fixture.sql.query(
            "CREATE TABLE employees (
                id INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                salary FLOAT,
                active BOOLEAN,
                hired DATE
            )",
            false,
        )?;
        fixture.sql.insert("employees", &sample_employees())?;
        Ok(fixture)
    }

    /// Opens a second connection to the same file
    pub fn reopen(&self) -> Result<Sql> {
        Sql::from_dsn(&self.path.to_string_lossy(), DbSystem::Sqlite)
    }
}

/// An ODBC configuration directory standing in for the user's home
pub struct OdbcFixture {
    pub dir: TempDir,
    pub registry: DsnRegistry,
}

impl OdbcFixture {
    /// Registry over an empty directory; `create_config` has not run
    pub fn empty() -> Result<Self> {
        init_logging();
        let dir = TempDir::new()?;
        let registry = DsnRegistry::new(OdbcPaths::in_dir(dir.path()));
        Ok(OdbcFixture { dir, registry })
    }

    /// Registry whose configuration files already exist
    pub fn initialised() -> Result<Self> {
        let fixture = Self::empty()?;
        fixture.registry.create_config()?;
        Ok(fixture)
    }

    pub fn odbc_ini(&self) -> String {
        std::fs::read_to_string(&self.registry.paths().odbc_ini).unwrap_or_default()
    }
}

fn date(y: i32, m: u32, d: u32) -> Value {
    NaiveDate::from_ymd_opt(y, m, d).map(Value::Date).unwrap_or(Value::Null)
}

/// Three employees covering every column type of the sample table,
/// including a null salary
pub fn sample_employees() -> Frame {
    Frame::from_rows(
        ["id", "name", "salary", "active", "hired"],
        vec![
            vec![Value::from(1), Value::from("Alice"), Value::from(5200.0), Value::from(true), date(2019, 3, 1)],
            vec![Value::from(2), Value::from("Bob"), Value::Null, Value::from(false), date(2021, 7, 15)],
            vec![Value::from(3), Value::from("Chidi"), Value::from(4100.5), Value::from(true), date(2023, 1, 9)],
        ],
    )
    .expect("sample employees are rectangular")
}

/// Small frame whose first column is all nulls, used to check type
/// inference skips leading nulls
pub fn sparse_frame() -> Frame {
    Frame::from_rows(
        ["note", "amount"],
        vec![
            vec![Value::Null, Value::Null],
            vec![Value::from("late"), Value::from(7)],
        ],
    )
    .expect("sparse frame is rectangular")
}

/// Error testing helpers
pub mod error_testing {
    use std::fmt::Display;

    /// Checks that an error message is present and says something useful
    pub fn verify_error_message_quality<T, E>(result: &std::result::Result<T, E>, context: &str)
    where
        E: Display,
    {
        match result {
            Ok(_) => panic!("{}: expected an error", context),
            Err(e) => {
                let message = e.to_string();
                assert!(!message.trim().is_empty(), "{}: error message is empty", context);
                assert!(message.len() > 10, "{}: error message too terse: {}", context, message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_fixture_isolated() {
        let first = DatabaseFixture::with_sample_data().unwrap();
        let second = DatabaseFixture::new().unwrap();
        assert!(first.sql.has_table("employees").unwrap());
        assert!(!second.sql.has_table("employees").unwrap());
        assert_ne!(first.path, second.path);
    }

    #[test]
    fn test_odbc_fixture_starts_empty() {
        let fixture = OdbcFixture::empty().unwrap();
        assert!(fixture.odbc_ini().is_empty());
        let ready = OdbcFixture::initialised().unwrap();
        assert!(ready.odbc_ini().contains("[Default]"));
    }
}
