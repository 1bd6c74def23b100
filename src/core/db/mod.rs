/// Database Module
///
/// The database access layer behind the `Sql` facade, split by concern:
/// - **Connection Management** (`connection.rs`): connection options, ODBC
///   connection strings and the `Backend` trait every driver implements
/// - **Backends** (`sqlite.rs`, `odbc.rs`): SQLite through rusqlite, SQL
///   Server through odbc-api (behind the `mssql` feature)
/// - **Dialect** (`dialect.rs`): identifier quoting, type names, generated DDL/DML
/// - **Schema Reflection** (`schema.rs`): tables and columns of a connected database
/// - **Query Execution** (`query.rs`): execution outcomes and statement classification
///
/// ## Error Handling
///
/// Driver errors are passed through unmodified inside `DbFrameError`.
pub mod connection;
pub mod dialect;
#[cfg(feature = "mssql")]
pub mod odbc;
pub mod query;
pub mod schema;
pub mod sqlite;

pub use connection::*;
pub use dialect::*;
pub use query::*;
pub use schema::*;
