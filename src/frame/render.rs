use super::{Frame, Value};
use crate::core::{DbFrameError, Result};
use std::fmt;
use std::str::FromStr;

/// Text formats a frame can be exported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = DbFrameError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            _ => Err(DbFrameError::InvalidArgument(format!(
                "Unsupported export format: '{}'. Supported formats: csv, json, markdown",
                s
            ))),
        }
    }
}

impl Frame {
    /// Exports the frame, index included, to the given format.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Csv => Ok(self.export_to_csv()),
            ExportFormat::Json => Ok(serde_json::to_string(&self.to_records())?),
            ExportFormat::Markdown => Ok(self.export_to_markdown()),
        }
    }

    /// Header and cell text with the index, if any, as the first column.
    fn text_grid(&self) -> (Vec<String>, Vec<Vec<String>>) {
        self.grid_with(Value::to_string)
    }

    fn grid_with(&self, cell: impl Fn(&Value) -> String) -> (Vec<String>, Vec<Vec<String>>) {
        let mut headers = Vec::with_capacity(self.columns.len() + 1);
        if let Some(index) = &self.index {
            headers.push(index.name.clone());
        }
        headers.extend(self.columns.iter().cloned());

        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let key = self.index.as_ref().map(|idx| cell(&idx.values[i]));
                key.into_iter().chain(row.iter().map(&cell)).collect()
            })
            .collect();
        (headers, rows)
    }

    /// Nulls are empty fields; empty strings are written as `""`.
    fn export_to_csv(&self) -> String {
        let (headers, rows) = self.grid_with(|value| match value {
            Value::Null => String::new(),
            Value::Text(text) if text.is_empty() => "\"\"".to_string(),
            other => csv_field(&other.to_string()),
        });
        let mut output = String::new();
        if !headers.is_empty() {
            let headers: Vec<String> = headers.iter().map(|h| csv_field(h)).collect();
            output.push_str(&headers.join(","));
            output.push('\n');
        }
        for row in &rows {
            output.push_str(&row.join(","));
            output.push('\n');
        }
        output
    }

    fn export_to_markdown(&self) -> String {
        let (headers, rows) = self.text_grid();
        let mut output = String::new();
        if !headers.is_empty() {
            output.push_str(&headers.join(" | "));
            output.push('\n');
            let underline: Vec<String> = headers.iter().map(|h| "-".repeat(h.len().max(3))).collect();
            output.push_str(&underline.join(" | "));
            output.push('\n');
        }
        for row in &rows {
            output.push_str(&row.join(" | "));
            output.push('\n');
        }
        output
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Aligned grid with a header underline, one line per row.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (headers, rows) = self.text_grid();
        if headers.is_empty() {
            return Ok(());
        }

        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let line = |cells: &[String]| -> String {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<width$}", c, width = *w))
                .collect();
            padded.join(" | ").trim_end().to_string()
        };

        writeln!(f, "{}", line(&headers))?;
        let underline: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", underline.join("-|-"))?;
        for row in &rows {
            writeln!(f, "{}", line(row))?;
        }
        Ok(())
    }
}
