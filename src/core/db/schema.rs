/// Schema Reflection Module
///
/// Reflects the tables of a connected database, and their columns, into a
/// `Metadata` snapshot the facade consults before reading, appending to or
/// dropping a table.

use super::connection::Backend;
use crate::core::Result;
use rusqlite::Row;
use std::collections::BTreeMap;
use tracing::debug;

/// Represents a database column with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared type name as reported by the database
    pub type_name: String,
    /// Whether the column allows NULL values
    pub nullable: bool,
    /// Whether this column is part of the primary key
    pub pk: bool,
}

impl Column {
    /// Creates a Column from a PRAGMA table_info result row
    pub(crate) fn from_pragma_row(row: &Row) -> rusqlite::Result<Self> {
        let notnull: bool = row.get(3)?;
        let pk: i64 = row.get(5)?;
        Ok(Column {
            name: row.get(1)?,
            type_name: row.get(2)?,
            nullable: !notnull,
            pk: pk > 0,
        })
    }
}

/// Represents a database table with its columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    /// Introspects one table; `None` when the database has no such table.
    pub fn reflect(backend: &dyn Backend, schema: Option<&str>, name: &str) -> Result<Option<Self>> {
        let columns = backend.table_columns(schema, name)?;
        if columns.is_empty() {
            return Ok(None);
        }
        Ok(Some(Table {
            name: name.to_string(),
            columns,
        }))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Snapshot of every table in one schema of the connected database
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub schema: Option<String>,
    pub tables: BTreeMap<String, Table>,
}

impl Metadata {
    /// Reflects all user tables in `schema` (the default schema when `None`)
    pub fn reflect(backend: &dyn Backend, schema: Option<&str>) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for name in backend.table_names(schema)? {
            if let Some(table) = Table::reflect(backend, schema, &name)? {
                tables.insert(name, table);
            }
        }
        debug!("Reflected {} tables", tables.len());
        Ok(Metadata {
            schema: schema.map(str::to_string),
            tables,
        })
    }

    /// Looks a table up the way both supported databases resolve names,
    /// ignoring ASCII case
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .get(name)
            .or_else(|| self.tables.values().find(|t| t.name.eq_ignore_ascii_case(name)))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::sqlite::SqliteBackend;

    fn setup_test_schema() -> SqliteBackend {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .connection()
            .execute_batch(
                "
                CREATE TABLE users (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT UNIQUE,
                    age INTEGER
                );
                CREATE TABLE posts (
                    id INTEGER PRIMARY KEY,
                    user_id INTEGER,
                    title TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id)
                );
            ",
            )
            .unwrap();
        backend
    }

    #[test]
    fn test_schema_reflection() {
        let backend = setup_test_schema();
        let metadata = Metadata::reflect(&backend, None).unwrap();

        assert_eq!(metadata.table_names(), vec!["posts", "users"]);

        let users = metadata.table("users").unwrap();
        assert_eq!(users.column_names(), vec!["id", "name", "email", "age"]);
        assert!(users.columns[0].pk);
        assert!(!users.columns[1].nullable);
        assert!(users.columns[3].nullable);
        assert_eq!(users.columns[1].type_name, "TEXT");
    }

    #[test]
    fn test_table_lookup_ignores_case() {
        let backend = setup_test_schema();
        let metadata = Metadata::reflect(&backend, None).unwrap();
        assert_eq!(metadata.table("USERS").unwrap().name, "users");
        assert_eq!(metadata.table("Posts").unwrap().name, "posts");
        assert!(metadata.table("user").is_none());
    }

    #[test]
    fn test_reflect_missing_table() {
        let backend = setup_test_schema();
        assert!(Table::reflect(&backend, None, "ghosts").unwrap().is_none());
    }
}
