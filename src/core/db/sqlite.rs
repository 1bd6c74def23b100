/// SQLite Backend
///
/// `Backend` implementation over a `rusqlite::Connection`. Values are
/// decoded using the column's declared type so that BOOLEAN, DATE and
/// DATETIME columns written by dbframe come back as the same `Value`
/// variants.

use super::connection::Backend;
use super::dialect::Dialect;
use super::query::RowSink;
use super::schema::Column;
use crate::core::Result;
use crate::frame::value::{DATETIME_FORMAT, DATE_FORMAT};
use crate::frame::{Frame, Record, Value};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, Statement};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Opens (creating if needed) the database file at `path`
    pub fn open(path: &str, busy_timeout: Option<Duration>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        if let Some(timeout) = busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        Self::init(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(SqliteBackend { conn })
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Column names and declared types of a prepared statement
fn describe(stmt: &Statement<'_>) -> (Vec<String>, Vec<Option<String>>) {
    stmt.columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_uppercase)))
        .unzip()
}

/// Converts a raw SQLite value, guided by the declared column type
fn decode(value: ValueRef<'_>, decl_type: Option<&str>) -> Value {
    let decl = decl_type.unwrap_or("");
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if decl.starts_with("BOOL") || decl == "BIT" => Value::Boolean(i != 0),
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => {
            let text = String::from_utf8_lossy(t);
            let parsed = if decl.starts_with("DATETIME") || decl.starts_with("TIMESTAMP") {
                Value::parse_datetime(&text).map(Value::DateTime)
            } else if decl.starts_with("DATE") {
                Value::parse_date(&text).map(Value::Date)
            } else {
                None
            };
            parsed.unwrap_or_else(|| Value::Text(text.into_owned()))
        }
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Boolean(b) => ToSqlOutput::Borrowed(ValueRef::Integer(*b as i64)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Date(d) => ToSqlOutput::from(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(dt) => ToSqlOutput::from(dt.format(DATETIME_FORMAT).to_string()),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn select(&self, sql: &str) -> Result<Frame> {
        debug!("sqlite select: {}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let (columns, decl_types) = describe(&stmt);

        let mut frame = Frame::new(columns);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(decl_types.len());
            for (i, decl) in decl_types.iter().enumerate() {
                values.push(decode(row.get_ref(i)?, decl.as_deref()));
            }
            frame.push_row(values)?;
        }
        Ok(frame)
    }

    fn for_each_row(&self, sql: &str, sink: &mut RowSink<'_>) -> Result<usize> {
        debug!("sqlite stream: {}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let (columns, decl_types) = describe(&stmt);

        let mut count = 0;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, (name, decl)) in columns.iter().zip(&decl_types).enumerate() {
                record.insert(name.clone(), decode(row.get_ref(i)?, decl.as_deref()));
            }
            sink(record)?;
            count += 1;
        }
        Ok(count)
    }

    fn execute(&self, sql: &str) -> Result<Option<usize>> {
        debug!("sqlite execute: {}", sql);
        match self.conn.execute(sql, []) {
            Ok(changed) => Ok(Some(changed)),
            // Statement produced rows (e.g. a PRAGMA); run it to completion
            Err(rusqlite::Error::ExecuteReturnedResults) => {
                let mut stmt = self.conn.prepare(sql)?;
                let mut rows = stmt.query([])?;
                while rows.next()?.is_some() {}
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn insert_rows(&self, sql: &str, rows: &[Vec<Value>]) -> Result<usize> {
        debug!("sqlite insert of {} rows: {}", rows.len(), sql);
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn table_names(&self, schema: Option<&str>) -> Result<Vec<String>> {
        let master = match schema {
            Some(schema) => format!("{}.sqlite_master", Dialect::Sqlite.quote_identifier(schema)),
            None => "sqlite_master".to_string(),
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT name FROM {} WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            master
        ))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn table_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<Column>> {
        let pragma = match schema {
            Some(schema) => format!("{}.table_info", Dialect::Sqlite.quote_identifier(schema)),
            None => "table_info".to_string(),
        };
        let mut stmt = self.conn.prepare(&format!(
            "PRAGMA {}({})",
            pragma,
            Dialect::Sqlite.quote_literal(table)
        ))?;
        let columns = stmt
            .query_map([], |row| Column::from_pragma_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }
}
