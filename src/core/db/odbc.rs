/// ODBC Backend (SQL Server)
///
/// `Backend` implementation over an `odbc_api::Connection`. Result sets are
/// fetched in columnar batches: binary columns into byte buffers, everything
/// else as text converted to `Value`s using the column's reported SQL data
/// type. A value larger than its buffer fails the fetch instead of being cut.

use super::connection::Backend;
use super::dialect::Dialect;
use super::query::RowSink;
use super::schema::Column;
use crate::core::Result;
use crate::frame::{Frame, Record, Value};
use odbc_api::buffers::{AnySlice, BufferDesc, ColumnarAnyBuffer};
use odbc_api::parameter::{InputParameter, VarBinaryBox};
use odbc_api::{Bit, Connection, ConnectionOptions, Cursor, DataType, Environment, IntoParameter, ResultSetMetadata};
use once_cell::sync::OnceCell;
use std::num::NonZeroUsize;
use tracing::{debug, warn};

/// Rows fetched per round trip
const BATCH_SIZE: usize = 5000;
/// Buffer for one cell of a column without a declared size, such as
/// VARCHAR(max) or VARBINARY(max)
const MAX_CELL_LEN: usize = 1 << 20;
/// Total bytes a fetch batch may bind; wide rows shrink the batch
const BATCH_BYTES: usize = 64 << 20;

static ODBC_ENV: OnceCell<Environment> = OnceCell::new();

pub struct OdbcBackend {
    connection: Connection<'static>,
}

impl OdbcBackend {
    /// Connects through the process-wide ODBC environment
    pub fn connect(connection_string: &str) -> Result<Self> {
        let env = ODBC_ENV.get_or_try_init(Environment::new)?;
        let connection = env.connect_with_connection_string(connection_string, ConnectionOptions::default())?;
        Ok(OdbcBackend { connection })
    }

    /// Executes `sql` and hands each decoded row to `on_row`. Returns the
    /// column names and the number of rows seen.
    fn stream(
        &self,
        sql: &str,
        on_row: &mut dyn FnMut(&[String], Vec<Value>) -> Result<()>,
    ) -> Result<(Vec<String>, usize)> {
        let Some(mut cursor) = self.connection.execute(sql, (), None)? else {
            return Ok((Vec::new(), 0));
        };

        let columns = cursor
            .column_names()?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        let mut types = Vec::with_capacity(columns.len());
        for i in 1..=columns.len() as u16 {
            types.push(cursor.col_data_type(i)?);
        }

        let descs: Vec<BufferDesc> = types.iter().map(buffer_desc).collect();
        let batch_size = batch_size(&descs);
        debug!("Binding {} columns, {} rows per batch", descs.len(), batch_size);
        let buffer = ColumnarAnyBuffer::try_from_descs(batch_size, descs.iter().copied())?;
        let mut row_set_cursor = cursor.bind_buffer(buffer)?;

        let mut count = 0;
        while let Some(batch) = row_set_cursor.fetch_with_truncation_check(true)? {
            for row in 0..batch.num_rows() {
                let values = types
                    .iter()
                    .enumerate()
                    .map(|(col, data_type)| read_cell(batch.column(col), row, data_type))
                    .collect();
                on_row(&columns, values)?;
                count += 1;
            }
        }
        Ok((columns, count))
    }
}

fn is_binary(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. }
    )
}

/// Byte buffer for binary columns, text for the rest. Columns without a
/// declared size get `MAX_CELL_LEN`.
fn buffer_desc(data_type: &DataType) -> BufferDesc {
    if is_binary(data_type) {
        let length = data_type.column_size().map(NonZeroUsize::get).unwrap_or(MAX_CELL_LEN);
        BufferDesc::Binary {
            length: length.min(MAX_CELL_LEN),
        }
    } else {
        let max_str_len = data_type.utf8_len().map(NonZeroUsize::get).unwrap_or(MAX_CELL_LEN);
        BufferDesc::Text {
            max_str_len: max_str_len.min(MAX_CELL_LEN),
        }
    }
}

/// Rows per fetch so the bound buffers stay within `BATCH_BYTES`
fn batch_size(descs: &[BufferDesc]) -> usize {
    let row_bytes: usize = descs
        .iter()
        .map(|desc| match desc {
            BufferDesc::Text { max_str_len } => max_str_len + 1,
            BufferDesc::Binary { length } => *length,
            _ => 16,
        })
        .sum();
    (BATCH_BYTES / row_bytes.max(1)).clamp(1, BATCH_SIZE)
}

fn read_cell(column: AnySlice<'_>, row: usize, data_type: &DataType) -> Value {
    if is_binary(data_type) {
        return match column.as_bin_view().and_then(|view| view.get(row)) {
            Some(bytes) => Value::Blob(bytes.to_vec()),
            None => Value::Null,
        };
    }
    decode(column.as_text_view().and_then(|view| view.get(row)), data_type)
}

/// Converts a text cell to a value according to the column's SQL type
fn decode(cell: Option<&[u8]>, data_type: &DataType) -> Value {
    let Some(bytes) = cell else {
        return Value::Null;
    };
    let text = String::from_utf8_lossy(bytes);
    let parsed = match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
            text.trim().parse().ok().map(Value::Integer)
        }
        DataType::Real | DataType::Double | DataType::Float { .. } | DataType::Decimal { .. } | DataType::Numeric { .. } => {
            text.trim().parse().ok().map(Value::Real)
        }
        DataType::Bit => Some(Value::Boolean(text.trim() == "1")),
        DataType::Date => Value::parse_date(&text).map(Value::Date),
        DataType::Timestamp { .. } => Value::parse_datetime(&text).map(Value::DateTime),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::Text(text.into_owned()))
}

/// Boxes a value as an ODBC input parameter
fn to_parameter(value: &Value) -> Box<dyn InputParameter> {
    match value {
        Value::Null => Box::new(None::<String>.into_parameter()),
        Value::Integer(i) => Box::new(*i),
        Value::Real(f) => Box::new(*f),
        Value::Boolean(b) => Box::new(Bit::from_bool(*b)),
        Value::Text(s) => Box::new(s.clone().into_parameter()),
        Value::Date(_) | Value::DateTime(_) => Box::new(value.to_string().into_parameter()),
        Value::Blob(b) => Box::new(VarBinaryBox::from_vec(b.clone())),
    }
}

impl OdbcBackend {
    fn insert_all(&self, sql: &str, rows: &[Vec<Value>]) -> Result<usize> {
        let mut prepared = self.connection.prepare(sql)?;
        for row in rows {
            let params: Vec<Box<dyn InputParameter>> = row.iter().map(to_parameter).collect();
            prepared.execute(params.as_slice())?;
        }
        Ok(rows.len())
    }
}

impl Backend for OdbcBackend {
    fn dialect(&self) -> Dialect {
        Dialect::MsSql
    }

    fn select(&self, sql: &str) -> Result<Frame> {
        debug!("odbc select: {}", sql);
        let mut rows = Vec::new();
        let (columns, _) = self.stream(sql, &mut |_, values| {
            rows.push(values);
            Ok(())
        })?;
        Frame::from_rows(columns, rows)
    }

    fn for_each_row(&self, sql: &str, sink: &mut RowSink<'_>) -> Result<usize> {
        debug!("odbc stream: {}", sql);
        let (_, count) = self.stream(sql, &mut |columns, values| {
            let record: Record = columns.iter().cloned().zip(values).collect();
            sink(record)
        })?;
        Ok(count)
    }

    fn execute(&self, sql: &str) -> Result<Option<usize>> {
        debug!("odbc execute: {}", sql);
        // Any cursor the statement opens is closed on drop
        let _cursor = self.connection.execute(sql, (), None)?;
        Ok(None)
    }

    fn insert_rows(&self, sql: &str, rows: &[Vec<Value>]) -> Result<usize> {
        debug!("odbc insert of {} rows: {}", rows.len(), sql);
        self.connection.set_autocommit(false)?;
        let result = self.insert_all(sql, rows);
        let finished = match &result {
            Ok(_) => self.connection.commit(),
            Err(e) => {
                warn!("Rolling back insert: {}", e);
                self.connection.rollback()
            }
        };
        self.connection.set_autocommit(true)?;
        finished?;
        result
    }

    fn table_names(&self, schema: Option<&str>) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_SCHEMA = {} ORDER BY TABLE_NAME",
            schema_predicate(schema)
        );
        let frame = self.select(&sql)?;
        Ok(frame.rows().iter().map(|row| row[0].to_string()).collect())
    }

    fn table_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<Column>> {
        let sql = format!(
            "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.IS_NULLABLE, \
               CASE WHEN EXISTS (SELECT 1 FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                 JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k \
                   ON k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA \
                 WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' AND k.TABLE_SCHEMA = c.TABLE_SCHEMA \
                   AND k.TABLE_NAME = c.TABLE_NAME AND k.COLUMN_NAME = c.COLUMN_NAME) \
               THEN 1 ELSE 0 END AS IS_PK \
             FROM INFORMATION_SCHEMA.COLUMNS c \
             WHERE c.TABLE_NAME = {} AND c.TABLE_SCHEMA = {} ORDER BY c.ORDINAL_POSITION",
            Dialect::MsSql.quote_literal(table),
            schema_predicate(schema)
        );
        let frame = self.select(&sql)?;
        Ok(frame
            .rows()
            .iter()
            .map(|row| Column {
                name: row[0].to_string(),
                type_name: row[1].to_string().to_uppercase(),
                nullable: row[2].to_string() == "YES",
                pk: row[3] == Value::Integer(1),
            })
            .collect())
    }
}

fn schema_predicate(schema: Option<&str>) -> String {
    match schema {
        Some(schema) => Dialect::MsSql.quote_literal(schema),
        None => "SCHEMA_NAME()".to_string(),
    }
}
