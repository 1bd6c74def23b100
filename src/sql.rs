//! Query Facade
//!
//! `Sql` owns one database connection and moves data between it and
//! in-memory [`Frame`]s: selecting whole tables, running arbitrary
//! statements, creating tables from a frame's layout and appending rows.
//!
//! Table lookups go through a reflected [`Metadata`] snapshot that is
//! refreshed after every call that may change the schema. Connections made
//! with `skip_reflect` query the database for each lookup instead.
//!
//! # Example
//!
//! ```no_run
//! use dbframe::{DbSystem, IfExists, OutputFormat, Sql};
//!
//! let mut sql = Sql::from_dsn("warehouse", DbSystem::MsSql)?;
//! let orders = sql.select_table("orders", OutputFormat::Frame, Some("order_id"))?;
//! sql.write_table(orders.as_frame().unwrap(), "orders_copy", IfExists::Replace, false)?;
//! # Ok::<(), dbframe::DbFrameError>(())
//! ```

use crate::config::Settings;
use crate::core::db::{self, Backend, ConnectOptions, DbSystem, Dialect, Metadata, QueryOutcome, SqlType, StatementType, Table, DEFAULT_CHAR_LIMIT};
use crate::core::{DbFrameError, Result};
use crate::frame::{Frame, Record};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

/// Shape of the data returned by [`Sql::select_table`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Frame,
    /// One [`Record`] per row
    Records,
}

/// Table contents in the requested [`OutputFormat`]
#[derive(Debug, Clone, PartialEq)]
pub enum TableData {
    Frame(Frame),
    Records(Vec<Record>),
}

impl TableData {
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            TableData::Frame(frame) => Some(frame),
            TableData::Records(_) => None,
        }
    }

    pub fn into_frame(self) -> Frame {
        match self {
            TableData::Frame(frame) => frame,
            TableData::Records(records) => Frame::from_records(&records),
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            TableData::Frame(frame) => frame.to_records(),
            TableData::Records(records) => records,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            TableData::Frame(frame) => frame.len(),
            TableData::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What [`Sql::write_table`] does when the target table already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfExists {
    /// Refuse with `TableExists`
    Fail,
    /// Insert the rows into the existing table
    Append,
    /// Drop the table and create it again
    Replace,
}

impl FromStr for IfExists {
    type Err = DbFrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail" => Ok(IfExists::Fail),
            "append" => Ok(IfExists::Append),
            "replace" => Ok(IfExists::Replace),
            other => Err(DbFrameError::InvalidArgument(format!(
                "{:?} is not a valid value for if_exists (expected fail, append or replace)",
                other
            ))),
        }
    }
}

impl fmt::Display for IfExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IfExists::Fail => write!(f, "fail"),
            IfExists::Append => write!(f, "append"),
            IfExists::Replace => write!(f, "replace"),
        }
    }
}

/// Tuning for table writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write the frame index as the leading column and index it
    pub index: bool,
    /// Length of VARCHAR columns created for text
    pub char_limit: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            index: true,
            char_limit: DEFAULT_CHAR_LIMIT,
        }
    }
}

impl WriteOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        WriteOptions {
            char_limit: settings.char_limit(),
            ..WriteOptions::default()
        }
    }
}

/// A connection to one database and the operations run through it
pub struct Sql {
    options: ConnectOptions,
    backend: Box<dyn Backend>,
    metadata: Option<Metadata>,
}

impl fmt::Debug for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sql")
            .field("options", &self.options)
            .field("tables", &self.metadata.as_ref().map(|m| m.tables.len()))
            .finish()
    }
}

impl Sql {
    /// Opens a connection and, unless `skip_reflect` is set, reflects the
    /// tables of the target schema.
    pub fn connect(options: ConnectOptions) -> Result<Self> {
        let backend = db::open(&options)?;
        let mut sql = Sql {
            options,
            backend,
            metadata: None,
        };
        sql.refresh()?;
        Ok(sql)
    }

    /// Trusted connection through a named data source. For SQLite the
    /// name is the database file.
    pub fn from_dsn(name: &str, system: DbSystem) -> Result<Self> {
        Sql::connect(ConnectOptions::dsn(system, name))
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    pub fn schema(&self) -> Option<&str> {
        self.options.schema.as_deref()
    }

    /// Runs arbitrary SQL. With `select` the rows come back as a frame;
    /// otherwise the statement runs for its effect.
    pub fn query(&mut self, sql: &str, select: bool) -> Result<QueryOutcome> {
        let outcome = if select {
            QueryOutcome::Rows(self.backend.select(sql)?)
        } else {
            QueryOutcome::Executed {
                rows_affected: self.backend.execute(sql)?,
            }
        };
        if StatementType::from_sql(sql).may_change_schema() {
            self.refresh()?;
        }
        Ok(outcome)
    }

    /// Streams the rows of `sql` into `on_row` without building a frame.
    /// Returns the number of rows delivered.
    pub fn lazy_query<F>(&self, sql: &str, mut on_row: F) -> Result<usize>
    where
        F: FnMut(Record) -> Result<()>,
    {
        self.backend.for_each_row(sql, &mut on_row)
    }

    /// Reads every row of `table`.
    ///
    /// For [`OutputFormat::Frame`], `index_column` is promoted to the
    /// frame index. Records always carry every column.
    pub fn select_table(&self, table: &str, format: OutputFormat, index_column: Option<&str>) -> Result<TableData> {
        let found = self.require_table(table)?;
        let sql = self.dialect().select_all_sql(self.schema(), &found.name);
        let frame = self.backend.select(&sql)?;
        match format {
            OutputFormat::Frame => match index_column {
                Some(column) => Ok(TableData::Frame(frame.set_index(column)?)),
                None => Ok(TableData::Frame(frame)),
            },
            OutputFormat::Records => Ok(TableData::Records(frame.to_records())),
        }
    }

    /// Writes `data` to `table` with default [`WriteOptions`].
    pub fn write_table(&mut self, data: &Frame, table: &str, if_exists: IfExists, create: bool) -> Result<usize> {
        self.write_table_with(data, table, if_exists, create, WriteOptions::default())
    }

    /// Writes `data` to `table`, creating the table from the frame's
    /// layout when needed. With `create` only the empty table is made.
    /// Returns the number of rows inserted.
    pub fn write_table_with(
        &mut self,
        data: &Frame,
        table: &str,
        if_exists: IfExists,
        create: bool,
        options: WriteOptions,
    ) -> Result<usize> {
        let result = self.write(data, table, if_exists, create, options);
        if let Err(e) = &result {
            error!("Writing to {} failed: {}", table, e);
        }
        // The table may have been created or dropped before a failure
        let refreshed = self.refresh();
        let written = result?;
        refreshed?;
        Ok(written)
    }

    fn write(&self, data: &Frame, table: &str, if_exists: IfExists, create: bool, options: WriteOptions) -> Result<usize> {
        let (layout, index_column) = match data.index() {
            Some(index) if options.index => (data.clone().reset_index(), Some(index.name.clone())),
            _ => (Frame::from_rows(data.columns().to_vec(), data.rows().to_vec())?, None),
        };
        if layout.width() == 0 {
            return Err(DbFrameError::Frame(format!(
                "cannot write a frame without columns to {}",
                table
            )));
        }

        let dialect = self.dialect();
        let schema = self.schema();
        if let Some(existing) = self.find_table(table)? {
            match if_exists {
                IfExists::Fail => return Err(DbFrameError::TableExists(existing.name)),
                IfExists::Append => return self.insert_frame(&layout, &existing.name),
                IfExists::Replace => {
                    self.backend.execute(&dialect.drop_table_sql(schema, &existing.name))?;
                    info!("Dropped table {} for replacement", existing.name);
                }
            }
        }

        let columns: Vec<(String, SqlType)> = layout
            .columns()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let ty = SqlType::for_values(layout.rows().iter().map(|row| &row[i]), options.char_limit);
                (name.clone(), ty)
            })
            .collect();
        self.backend.execute(&dialect.create_table_sql(schema, table, &columns))?;
        info!("Created table {} with {} columns", table, columns.len());

        let filled = self.fill_new_table(&layout, table, index_column.as_deref(), create);
        if filled.is_err() {
            // Leave no half-written table behind
            match self.backend.execute(&dialect.drop_table_sql(schema, table)) {
                Ok(_) => info!("Dropped table {} after a failed write", table),
                Err(e) => warn!("Could not drop partially written table {}: {}", table, e),
            }
        }
        filled
    }

    fn fill_new_table(&self, layout: &Frame, table: &str, index_column: Option<&str>, create: bool) -> Result<usize> {
        if let Some(column) = index_column {
            self.backend
                .execute(&self.dialect().create_index_sql(self.schema(), table, column))?;
        }
        if create {
            return Ok(0);
        }
        self.insert_frame(layout, table)
    }

    fn insert_frame(&self, layout: &Frame, table: &str) -> Result<usize> {
        if layout.is_empty() {
            return Ok(0);
        }
        let sql = self.dialect().insert_sql(self.schema(), table, layout.columns());
        let written = self.backend.insert_rows(&sql, layout.rows())?;
        debug!("Inserted {} rows into {}", written, table);
        Ok(written)
    }

    /// Appends the rows of `data`, creating the table if it is missing.
    pub fn insert(&mut self, table: &str, data: &Frame) -> Result<usize> {
        self.write_table(data, table, IfExists::Append, false)
    }

    /// Appends records; columns are the union of their keys.
    pub fn insert_records(&mut self, table: &str, records: &[Record]) -> Result<usize> {
        self.insert(table, &Frame::from_records(records))
    }

    pub fn drop_table(&mut self, table: &str) -> Result<()> {
        let found = self.require_table(table)?;
        let sql = self.dialect().drop_table_sql(self.schema(), &found.name);
        self.backend.execute(&sql)?;
        info!("Dropped table {}", found.name);
        self.refresh()
    }

    /// Names of the tables in the current schema
    pub fn tables(&self) -> Result<Vec<String>> {
        match &self.metadata {
            Some(metadata) => Ok(metadata.table_names()),
            None => self.backend.table_names(self.schema()),
        }
    }

    pub fn has_table(&self, table: &str) -> Result<bool> {
        Ok(self.find_table(table)?.is_some())
    }

    /// Reflected description of `table`, if it exists
    pub fn table(&self, table: &str) -> Result<Option<Table>> {
        self.find_table(table)
    }

    /// Re-reads table metadata. Does nothing when reflection is skipped.
    pub fn refresh(&mut self) -> Result<()> {
        if self.options.skip_reflect {
            return Ok(());
        }
        debug!("Reflecting tables of {}", self.options.target());
        self.metadata = Some(Metadata::reflect(self.backend.as_ref(), self.schema())?);
        Ok(())
    }

    /// Reconnects to another database on the same server. DSN-based SQL
    /// Server connections name their database in `odbc.ini` and cannot be
    /// switched. For SQLite `database` is the new file.
    pub fn change_database(&mut self, database: &str) -> Result<()> {
        let mut options = self.options.clone();
        match (options.system, options.dsn.clone()) {
            (DbSystem::Sqlite, Some(_)) => options.dsn = Some(database.to_string()),
            (DbSystem::Sqlite, None) => options.host = Some(database.to_string()),
            (DbSystem::MsSql, Some(dsn)) => {
                return Err(DbFrameError::InvalidArgument(format!(
                    "cannot change the database of dsn {}; connect with an explicit host instead",
                    dsn
                )))
            }
            (DbSystem::MsSql, None) => options.database = Some(database.to_string()),
        }
        self.reconnect(options)
    }

    /// Points table operations at another schema. For SQLite this is the
    /// name of an attached database.
    pub fn change_schema(&mut self, schema: &str) -> Result<()> {
        let previous = self.options.schema.replace(schema.to_string());
        if let Err(e) = self.refresh() {
            self.options.schema = previous;
            return Err(e);
        }
        info!("Switched to schema {}", schema);
        Ok(())
    }

    /// Swaps in a connection made from `options`; the current one is kept
    /// if the new one cannot be opened.
    fn reconnect(&mut self, options: ConnectOptions) -> Result<()> {
        let backend = db::open(&options)?;
        self.backend = backend;
        self.options = options;
        self.metadata = None;
        self.refresh()
    }

    fn find_table(&self, table: &str) -> Result<Option<Table>> {
        match &self.metadata {
            Some(metadata) => Ok(metadata.table(table).cloned()),
            None => Table::reflect(self.backend.as_ref(), self.schema(), table),
        }
    }

    fn require_table(&self, table: &str) -> Result<Table> {
        self.find_table(table)?
            .ok_or_else(|| DbFrameError::TableNotFound(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Value;

    fn memory(skip_reflect: bool) -> Sql {
        Sql::connect(ConnectOptions::dsn(DbSystem::Sqlite, ":memory:").skip_reflect(skip_reflect)).unwrap()
    }

    fn scores() -> Frame {
        Frame::from_rows(
            ["player", "points"],
            vec![
                vec![Value::from("ann"), Value::from(12)],
                vec![Value::from("bo"), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_if_exists_parsing() {
        assert_eq!("fail".parse::<IfExists>().unwrap(), IfExists::Fail);
        assert_eq!("append".parse::<IfExists>().unwrap(), IfExists::Append);
        assert_eq!("replace".parse::<IfExists>().unwrap(), IfExists::Replace);
        assert!(matches!("upsert".parse::<IfExists>(), Err(DbFrameError::InvalidArgument(_))));
        assert_eq!(IfExists::Replace.to_string(), "replace");
    }

    #[test]
    fn test_write_options_from_settings() {
        let settings: Settings = toml::from_str("[write]\nchar_limit = 32\n").unwrap();
        let options = WriteOptions::from_settings(&settings);
        assert_eq!(options.char_limit, 32);
        assert!(options.index);
    }

    #[test]
    fn test_write_then_select() {
        let mut sql = memory(false);
        assert_eq!(sql.write_table(&scores(), "scores", IfExists::Fail, false).unwrap(), 2);
        assert!(sql.has_table("scores").unwrap());

        let data = sql.select_table("scores", OutputFormat::Frame, None).unwrap();
        assert_eq!(data.into_frame(), scores());
    }

    #[test]
    fn test_create_only_makes_empty_table() {
        let mut sql = memory(false);
        assert_eq!(sql.write_table(&scores(), "scores", IfExists::Fail, true).unwrap(), 0);
        let table = sql.table("scores").unwrap().unwrap();
        assert_eq!(table.column_names(), vec!["player", "points"]);
        assert_eq!(table.columns[0].type_name, "VARCHAR(255)");
        assert_eq!(table.columns[1].type_name, "BIGINT");
        assert!(sql.select_table("scores", OutputFormat::Records, None).unwrap().is_empty());
    }

    #[test]
    fn test_replace_recreates_table() {
        let mut sql = memory(false);
        sql.write_table(&scores(), "scores", IfExists::Fail, false).unwrap();
        let single = Frame::from_rows(["flag"], vec![vec![Value::from(true)]]).unwrap();
        sql.write_table(&single, "scores", IfExists::Replace, false).unwrap();

        let frame = sql.select_table("scores", OutputFormat::Frame, None).unwrap().into_frame();
        assert_eq!(frame, single);
    }

    #[test]
    fn test_index_written_as_leading_column() {
        let mut sql = memory(false);
        let indexed = scores().set_index("player").unwrap();
        sql.write_table(&indexed, "scores", IfExists::Fail, false).unwrap();

        let columns = sql.table("scores").unwrap().unwrap();
        assert_eq!(columns.column_names(), vec!["player", "points"]);
        let indexes = sql
            .query("SELECT name FROM sqlite_master WHERE type = 'index'", true)
            .unwrap()
            .into_frame()
            .unwrap();
        assert_eq!(indexes.rows()[0][0], Value::from("ix_6_scores_player"));

        let back = sql.select_table("scores", OutputFormat::Frame, Some("player")).unwrap();
        assert_eq!(back.into_frame(), indexed);
    }

    #[test]
    fn test_similar_table_and_index_names_coexist() {
        let mut sql = memory(false);
        let first = Frame::from_rows(["b_c", "v"], vec![vec![Value::from(1), Value::from(2)]])
            .unwrap()
            .set_index("b_c")
            .unwrap();
        let second = Frame::from_rows(["c", "v"], vec![vec![Value::from(3), Value::from(4)]])
            .unwrap()
            .set_index("c")
            .unwrap();
        assert_eq!(sql.write_table(&first, "a", IfExists::Fail, false).unwrap(), 1);
        assert_eq!(sql.write_table(&second, "a_b", IfExists::Fail, false).unwrap(), 1);
        assert_eq!(sql.tables().unwrap(), vec!["a", "a_b"]);
    }

    #[test]
    fn test_failed_index_leaves_no_table() {
        let mut sql = memory(false);
        sql.query("CREATE TABLE other (x INTEGER)", false).unwrap();
        sql.query("CREATE INDEX ix_6_scores_player ON other (x)", false).unwrap();

        let indexed = scores().set_index("player").unwrap();
        let result = sql.write_table(&indexed, "scores", IfExists::Fail, false);
        assert!(matches!(result, Err(DbFrameError::Database(_))));
        assert!(!sql.has_table("scores").unwrap());
        assert_eq!(sql.tables().unwrap(), vec!["other"]);
    }

    #[test]
    fn test_table_names_match_case_insensitively() {
        for skip_reflect in [false, true] {
            let mut sql = memory(skip_reflect);
            sql.insert("scores", &scores()).unwrap();
            assert_eq!(sql.insert("Scores", &scores()).unwrap(), 2);
            assert!(sql.has_table("SCORES").unwrap());

            let frame = sql.select_table("Scores", OutputFormat::Frame, None).unwrap().into_frame();
            assert_eq!(frame.len(), 4);
            assert_eq!(sql.tables().unwrap(), vec!["scores"]);

            sql.drop_table("SCORES").unwrap();
            assert!(!sql.has_table("scores").unwrap());
        }
    }

    #[test]
    fn test_index_dropped_when_disabled() {
        let mut sql = memory(false);
        let indexed = scores().set_index("player").unwrap();
        let options = WriteOptions {
            index: false,
            ..WriteOptions::default()
        };
        sql.write_table_with(&indexed, "scores", IfExists::Fail, false, options).unwrap();
        assert_eq!(sql.table("scores").unwrap().unwrap().column_names(), vec!["points"]);
    }

    #[test]
    fn test_frame_without_columns_rejected() {
        let mut sql = memory(false);
        let empty = Frame::default();
        assert!(matches!(
            sql.write_table(&empty, "nothing", IfExists::Fail, true),
            Err(DbFrameError::Frame(_))
        ));
        assert!(!sql.has_table("nothing").unwrap());
    }

    #[test]
    fn test_query_refreshes_metadata_after_ddl() {
        let mut sql = memory(false);
        let outcome = sql.query("CREATE TABLE t (id INTEGER)", false).unwrap();
        assert_eq!(outcome, QueryOutcome::Executed { rows_affected: Some(0) });
        assert_eq!(sql.tables().unwrap(), vec!["t"]);
    }

    #[test]
    fn test_skip_reflect_looks_up_live() {
        let mut sql = memory(true);
        sql.query("CREATE TABLE t (id INTEGER)", false).unwrap();
        assert!(sql.has_table("t").unwrap());
        assert_eq!(sql.tables().unwrap(), vec!["t"]);
        sql.drop_table("t").unwrap();
        assert!(!sql.has_table("t").unwrap());
    }

    #[test]
    fn test_lazy_query_streams_records() {
        let mut sql = memory(false);
        sql.insert("scores", &scores()).unwrap();

        let mut players = Vec::new();
        let count = sql
            .lazy_query("SELECT player FROM scores ORDER BY player", |record| {
                players.push(record["player"].to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(players, vec!["ann", "bo"]);
    }

    #[test]
    fn test_change_database_switches_sqlite_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = dir.path().join("first.db");
        let second = dir.path().join("second.db");

        let mut sql = Sql::from_dsn(first.to_str().unwrap(), DbSystem::Sqlite).unwrap();
        sql.insert("scores", &scores()).unwrap();

        sql.change_database(second.to_str().unwrap()).unwrap();
        assert_eq!(sql.options().dsn.as_deref(), second.to_str());
        assert!(sql.tables().unwrap().is_empty());
        assert!(matches!(
            sql.select_table("scores", OutputFormat::Frame, None),
            Err(DbFrameError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_failed_reconnect_keeps_connection() {
        let mut sql = memory(false);
        sql.insert("scores", &scores()).unwrap();
        assert!(matches!(
            sql.change_database("/nonexistent/dir/other.db"),
            Err(DbFrameError::Connection { .. })
        ));
        assert!(sql.has_table("scores").unwrap());
    }

    #[test]
    fn test_change_schema_to_attached_database() {
        let mut sql = memory(false);
        sql.query("ATTACH DATABASE ':memory:' AS aux", false).unwrap();
        sql.query("CREATE TABLE aux.logs (line TEXT)", false).unwrap();

        sql.change_schema("aux").unwrap();
        assert_eq!(sql.schema(), Some("aux"));
        assert_eq!(sql.tables().unwrap(), vec!["logs"]);

        assert!(sql.change_schema("missing").is_err());
        assert_eq!(sql.schema(), Some("aux"));
    }
}
