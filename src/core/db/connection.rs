/// Connection Management Module
///
/// This module describes how to reach a database (`ConnectOptions`), builds
/// ODBC connection strings, and opens the backend that owns the driver
/// session for the lifetime of a `Sql` facade.

use super::dialect::Dialect;
use super::query::RowSink;
use super::schema::Column;
use super::sqlite::SqliteBackend;
use crate::config::Settings;
use crate::core::{DbFrameError, Result};
use crate::frame::{Frame, Value};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// ODBC driver named in explicit SQL Server connection strings by default
pub const DEFAULT_ODBC_DRIVER: &str = "FreeTDS";

/// The database systems dbframe can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbSystem {
    /// Microsoft SQL Server (and Azure SQL) through ODBC
    MsSql,
    /// SQLite database files
    Sqlite,
}

impl DbSystem {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbSystem::MsSql => Dialect::MsSql,
            DbSystem::Sqlite => Dialect::Sqlite,
        }
    }
}

impl FromStr for DbSystem {
    type Err = DbFrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mssql" => Ok(DbSystem::MsSql),
            "sqlite" => Ok(DbSystem::Sqlite),
            _ => Err(DbFrameError::InvalidArgument(format!(
                "{} is not a supported database system (expected mssql or sqlite)",
                s
            ))),
        }
    }
}

impl fmt::Display for DbSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbSystem::MsSql => write!(f, "mssql"),
            DbSystem::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// How the connection authenticates
#[derive(Debug)]
pub enum Credentials {
    /// Use the current user's credentials (integrated security)
    Trusted,
    /// Explicit user name and password
    Login { uid: String, pwd: SecretString },
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        match self {
            Credentials::Trusted => Credentials::Trusted,
            Credentials::Login { uid, pwd } => Credentials::Login {
                uid: uid.clone(),
                pwd: SecretString::from(pwd.expose_secret().to_string()),
            },
        }
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Credentials::Trusted, Credentials::Trusted) => true,
            (Credentials::Login { uid: a, pwd: p }, Credentials::Login { uid: b, pwd: q }) => {
                a == b && p.expose_secret() == q.expose_secret()
            }
            _ => false,
        }
    }
}

/// Where and how to connect.
///
/// Either a DSN (for SQL Server, a name from the user's `odbc.ini`; for
/// SQLite, the database file path) or an explicit host/port/database
/// triple. For SQLite the explicit host is the file path.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub system: DbSystem,
    pub dsn: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub driver: Option<String>,
    pub schema: Option<String>,
    pub credentials: Credentials,
    pub skip_reflect: bool,
    pub busy_timeout: Option<Duration>,
}

impl ConnectOptions {
    /// Options for a connection through a named data source
    pub fn dsn(system: DbSystem, dsn: impl Into<String>) -> Self {
        ConnectOptions {
            system,
            dsn: Some(dsn.into()),
            host: None,
            port: None,
            database: None,
            driver: None,
            schema: None,
            credentials: Credentials::Trusted,
            skip_reflect: false,
            busy_timeout: None,
        }
    }

    /// Options for a connection to an explicit host, port and database
    pub fn explicit(system: DbSystem, host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        ConnectOptions {
            dsn: None,
            host: Some(host.into()),
            port: Some(port),
            database: Some(database.into()),
            ..ConnectOptions::dsn(system, "")
        }
    }

    pub fn with_login(mut self, uid: impl Into<String>, pwd: impl Into<String>) -> Self {
        self.credentials = Credentials::Login {
            uid: uid.into(),
            pwd: SecretString::from(pwd.into()),
        };
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Skip table reflection; lookups then query the database each time
    pub fn skip_reflect(mut self, skip: bool) -> Self {
        self.skip_reflect = skip;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Fills the driver and busy timeout from settings where not already set
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        if self.driver.is_none() {
            self.driver = Some(settings.driver_name().to_string());
        }
        if self.busy_timeout.is_none() {
            self.busy_timeout = settings.busy_timeout();
        }
        self
    }

    /// Human-readable description of the target, without secrets
    pub fn target(&self) -> String {
        match (&self.dsn, self.system) {
            (Some(dsn), _) => format!("{} dsn {}", self.system, dsn),
            (None, DbSystem::Sqlite) => format!("sqlite file {}", self.host.as_deref().unwrap_or("")),
            (None, DbSystem::MsSql) => format!(
                "mssql server {},{} database {}",
                self.host.as_deref().unwrap_or(""),
                self.port.map(|p| p.to_string()).unwrap_or_default(),
                self.database.as_deref().unwrap_or("")
            ),
        }
    }

    /// ODBC connection string for SQL Server
    #[cfg(feature = "mssql")]
    pub fn connection_string(&self) -> Result<String> {
        use odbc_api::escape_attribute_value;

        let mut parts = Vec::new();
        match (&self.dsn, &self.host, self.port, &self.database) {
            (Some(dsn), _, _, _) => parts.push(format!("DSN={}", escape_attribute_value(dsn))),
            (None, Some(host), Some(port), Some(database)) => {
                let driver = self.driver.as_deref().unwrap_or(DEFAULT_ODBC_DRIVER);
                parts.push(format!("Driver={{{}}}", driver));
                parts.push(format!("Server={}", escape_attribute_value(&format!("{},{}", host, port))));
                parts.push(format!("Database={}", escape_attribute_value(database)));
            }
            _ => {
                return Err(DbFrameError::InvalidArgument(
                    "must supply either a dsn or a host, port and database".to_string(),
                ))
            }
        }

        match &self.credentials {
            Credentials::Trusted => parts.push("Trusted_Connection=yes".to_string()),
            Credentials::Login { uid, pwd } => {
                parts.push(format!("UID={}", escape_attribute_value(uid)));
                parts.push(format!("PWD={}", escape_attribute_value(pwd.expose_secret())));
            }
        }

        Ok(parts.join(";") + ";")
    }

    /// Database file for SQLite connections
    pub fn sqlite_path(&self) -> Result<&str> {
        self.dsn
            .as_deref()
            .or(self.host.as_deref())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                DbFrameError::InvalidArgument("sqlite connections need a database file path".to_string())
            })
    }
}

/// An open driver session.
///
/// Implemented once per database system; the facade only talks to this
/// trait and to the `Dialect` it reports.
pub trait Backend {
    fn dialect(&self) -> Dialect;

    /// Runs a statement expected to return rows
    fn select(&self, sql: &str) -> Result<Frame>;

    /// Runs a statement and feeds each row to `sink`; returns the row count
    fn for_each_row(&self, sql: &str, sink: &mut RowSink<'_>) -> Result<usize>;

    /// Runs a statement for its effect
    fn execute(&self, sql: &str) -> Result<Option<usize>>;

    /// Executes a parameterised statement once per row inside one
    /// transaction; returns the number of rows written
    fn insert_rows(&self, sql: &str, rows: &[Vec<Value>]) -> Result<usize>;

    /// User tables in `schema`, or the default schema
    fn table_names(&self, schema: Option<&str>) -> Result<Vec<String>>;

    /// Columns of a table, empty when the table does not exist
    fn table_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<Column>>;
}

/// Opens the backend described by `options`
///
/// Any failure to reach the database is reported as
/// `DbFrameError::Connection` naming the target.
pub fn open(options: &ConnectOptions) -> Result<Box<dyn Backend>> {
    let target = options.target();
    let connection_error = |reason: String| DbFrameError::Connection {
        target: target.clone(),
        reason,
    };

    let backend: Box<dyn Backend> = match options.system {
        DbSystem::Sqlite => {
            let path = options.sqlite_path()?;
            let backend = SqliteBackend::open(path, options.busy_timeout)
                .map_err(|e| connection_error(e.to_string()))?;
            Box::new(backend)
        }
        #[cfg(feature = "mssql")]
        DbSystem::MsSql => {
            let conn_str = options.connection_string()?;
            let backend = super::odbc::OdbcBackend::connect(&conn_str)
                .map_err(|e| connection_error(e.to_string()))?;
            Box::new(backend)
        }
        #[cfg(not(feature = "mssql"))]
        DbSystem::MsSql => {
            return Err(DbFrameError::Unsupported(
                "SQL Server connections require the `mssql` feature".to_string(),
            ))
        }
    };

    info!("Connected to {}", target);
    Ok(backend)
}
