/// Query Execution Module
///
/// Result types returned by statement execution and the statement
/// classification the facade uses to decide when reflected metadata has
/// gone stale.

use crate::frame::{Frame, Record};
use crate::core::Result;
use once_cell::sync::Lazy;
use regex::Regex;

/// `SELECT ... INTO new_table` creates a table on SQL Server
static SELECT_INTO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bINTO\s+[\[\x22#@\w]").expect("select-into pattern is valid"));

/// Represents the result of executing arbitrary SQL
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Rows returned by a select
    Rows(Frame),
    /// Acknowledgment of a statement run for its effect. SQLite reports
    /// the number of changed rows; ODBC drivers may not.
    Executed { rows_affected: Option<usize> },
}

impl QueryOutcome {
    /// The returned rows, if this was a select.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            QueryOutcome::Rows(frame) => Some(frame),
            QueryOutcome::Executed { .. } => None,
        }
    }
}

/// Callback receiving streamed rows; returning an error stops the stream.
pub type RowSink<'a> = dyn FnMut(Record) -> Result<()> + 'a;

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    /// SELECT statement
    Select,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// CREATE statement
    Create,
    /// DROP statement
    Drop,
    /// ALTER statement
    Alter,
    /// BEGIN/COMMIT/ROLLBACK transaction commands
    Transaction,
    /// Other statement types
    Other,
}

impl StatementType {
    /// Determines the statement type from a SQL string
    pub fn from_sql(sql: &str) -> Self {
        let sql_upper = sql.trim().to_uppercase();

        if sql_upper.starts_with("SELECT") || sql_upper.starts_with("WITH") {
            if SELECT_INTO_RE.is_match(&sql_upper) {
                StatementType::Create
            } else {
                StatementType::Select
            }
        } else if sql_upper.starts_with("INSERT") {
            StatementType::Insert
        } else if sql_upper.starts_with("UPDATE") {
            StatementType::Update
        } else if sql_upper.starts_with("DELETE") {
            StatementType::Delete
        } else if sql_upper.starts_with("CREATE") {
            StatementType::Create
        } else if sql_upper.starts_with("DROP") {
            StatementType::Drop
        } else if sql_upper.starts_with("ALTER") {
            StatementType::Alter
        } else if sql_upper == "BEGIN"
            || sql_upper == "COMMIT"
            || sql_upper == "ROLLBACK"
            || sql_upper.starts_with("BEGIN TRAN")
            || sql_upper.starts_with("COMMIT TRAN")
            || sql_upper.starts_with("ROLLBACK TRAN")
        {
            StatementType::Transaction
        } else {
            StatementType::Other
        }
    }

    /// Whether running the statement may add, remove or reshape tables.
    /// Unclassified statements are assumed to.
    pub fn may_change_schema(&self) -> bool {
        matches!(
            self,
            StatementType::Create | StatementType::Drop | StatementType::Alter | StatementType::Other
        )
    }
}
