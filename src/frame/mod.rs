//! In-memory tabular data.
//!
//! A [`Frame`] is the crate's dataframe: named columns, rows of [`Value`]s
//! and an optional index column promoted out of the data to act as the
//! row key. [`Record`]s are the "list of dictionaries" view of the same
//! data.
mod render;
pub(crate) mod value;

pub use render::ExportFormat;
pub use value::Value;

use crate::core::{DbFrameError, Result};
use std::collections::BTreeMap;

/// One row keyed by column name.
pub type Record = BTreeMap<String, Value>;

/// A named column promoted to the row key of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameIndex {
    pub name: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    index: Option<FrameIndex>,
}

impl Frame {
    /// Creates an empty frame with the given column names.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Frame {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            index: None,
        }
    }

    /// Creates a frame from column names and rows, checking every row has
    /// one value per column.
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let mut frame = Frame::new(columns);
        frame.rows.reserve(rows.len());
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if self.index.is_some() {
            return Err(DbFrameError::Frame(
                "cannot push an unkeyed row onto an indexed frame".to_string(),
            ));
        }
        if row.len() != self.columns.len() {
            return Err(DbFrameError::Frame(format!(
                "row has {} values but the frame has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of data columns, not counting the index.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one data column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let pos = self.column_position(name)?;
        Some(self.rows.iter().map(|row| &row[pos]).collect())
    }

    pub fn index(&self) -> Option<&FrameIndex> {
        self.index.as_ref()
    }

    /// Promotes a data column to the frame index, removing it from the
    /// data columns. An existing index is returned to the data first.
    pub fn set_index(self, name: &str) -> Result<Frame> {
        let mut frame = self.reset_index();
        let pos = frame
            .column_position(name)
            .ok_or_else(|| DbFrameError::Frame(format!("column {} not found", name)))?;

        let column = frame.columns.remove(pos);
        let values = frame.rows.iter_mut().map(|row| row.remove(pos)).collect();
        frame.index = Some(FrameIndex { name: column, values });
        Ok(frame)
    }

    /// Moves the index, if any, back into the data as the leading column.
    pub fn reset_index(mut self) -> Frame {
        if let Some(index) = self.index.take() {
            self.columns.insert(0, index.name);
            for (row, key) in self.rows.iter_mut().zip(index.values) {
                row.insert(0, key);
            }
        }
        self
    }

    /// True when some row equals `row` (index excluded).
    pub fn contains_row(&self, row: &[Value]) -> bool {
        self.rows.iter().any(|r| r.as_slice() == row)
    }

    /// Builds a frame from records. Columns are the sorted union of all
    /// record keys; keys missing from a record become `Null`.
    pub fn from_records(records: &[Record]) -> Frame {
        let mut columns: Vec<String> = records
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect();
        columns.sort();
        columns.dedup();

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Frame {
            columns,
            rows,
            index: None,
        }
    }

    /// One record per row. The index column, when present, is included.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut record: Record = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                if let Some(index) = &self.index {
                    record.insert(index.name.clone(), index.values[i].clone());
                }
                record
            })
            .collect()
    }

    /// Parses a JSON array of objects into a frame.
    pub fn from_json_records(json: &str) -> Result<Frame> {
        let raw: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(json)?;
        let records: Vec<Record> = raw
            .into_iter()
            .map(|obj| {
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect()
            })
            .collect();
        Ok(Frame::from_records(&records))
    }
}
