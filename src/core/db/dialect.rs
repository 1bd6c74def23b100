/// SQL Dialect Module
///
/// Generates the SQL text the facade sends to each backend: identifier
/// quoting, column type names and the handful of DDL/DML statements
/// needed for table writes.

use crate::frame::Value;

/// Varchar length used when none is configured.
pub const DEFAULT_CHAR_LIMIT: usize = 255;

/// The SQL flavour spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MsSql,
}

/// Column types dbframe creates when writing a frame to a new table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    BigInt,
    Float,
    Boolean,
    VarChar(usize),
    Date,
    DateTime,
    Text,
    Blob,
}

impl SqlType {
    /// Maps a sample value to the column type that stores it.
    pub fn infer(value: &Value, char_limit: usize) -> SqlType {
        match value {
            Value::Integer(_) => SqlType::BigInt,
            Value::Real(_) => SqlType::Float,
            Value::Boolean(_) => SqlType::Boolean,
            Value::Text(_) => SqlType::VarChar(char_limit),
            Value::Date(_) => SqlType::Date,
            Value::DateTime(_) => SqlType::DateTime,
            Value::Blob(_) => SqlType::Blob,
            Value::Null => SqlType::Text,
        }
    }

    /// Type of a column judged by its first non-null value; an all-null
    /// column is TEXT.
    pub fn for_values<'a>(values: impl IntoIterator<Item = &'a Value>, char_limit: usize) -> SqlType {
        values
            .into_iter()
            .find(|v| !v.is_null())
            .map(|v| SqlType::infer(v, char_limit))
            .unwrap_or(SqlType::Text)
    }
}

impl Dialect {
    /// Quotes an identifier, escaping the closing quote character.
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MsSql => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    /// Quotes a string literal.
    pub fn quote_literal(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    /// `schema.table`, both parts quoted.
    pub fn qualified(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(table)
            ),
            None => self.quote_identifier(table),
        }
    }

    pub fn type_name(&self, ty: SqlType) -> String {
        match (self, ty) {
            (_, SqlType::BigInt) => "BIGINT".to_string(),
            (_, SqlType::Float) => "FLOAT".to_string(),
            (Dialect::Sqlite, SqlType::Boolean) => "BOOLEAN".to_string(),
            (Dialect::MsSql, SqlType::Boolean) => "BIT".to_string(),
            (_, SqlType::VarChar(n)) => format!("VARCHAR({})", n),
            (_, SqlType::Date) => "DATE".to_string(),
            (_, SqlType::DateTime) => "DATETIME".to_string(),
            (Dialect::Sqlite, SqlType::Text) => "TEXT".to_string(),
            (Dialect::MsSql, SqlType::Text) => "VARCHAR(max)".to_string(),
            (Dialect::Sqlite, SqlType::Blob) => "BLOB".to_string(),
            (Dialect::MsSql, SqlType::Blob) => "VARBINARY(max)".to_string(),
        }
    }

    pub fn create_table_sql(&self, schema: Option<&str>, table: &str, columns: &[(String, SqlType)]) -> String {
        let defs: Vec<String> = columns
            .iter()
            .map(|(name, ty)| format!("{} {}", self.quote_identifier(name), self.type_name(*ty)))
            .collect();
        format!("CREATE TABLE {} ({})", self.qualified(schema, table), defs.join(", "))
    }

    /// Name of the index `create_index_sql` builds on `table.column`.
    ///
    /// SQL Server scopes index names to their table. SQLite shares one
    /// namespace per schema, so the table name's length is encoded to keep
    /// `("a", "b_c")` and `("a_b", "c")` apart.
    pub fn index_name(&self, table: &str, column: &str) -> String {
        match self {
            Dialect::Sqlite => format!("ix_{}_{}_{}", table.chars().count(), table, column),
            Dialect::MsSql => format!("ix_{}_{}", table, column),
        }
    }

    /// `CREATE INDEX` on one column. SQLite places the schema on the index
    /// name, SQL Server on the table.
    pub fn create_index_sql(&self, schema: Option<&str>, table: &str, column: &str) -> String {
        let index_name = self.index_name(table, column);
        let column = self.quote_identifier(column);
        match self {
            Dialect::Sqlite => format!(
                "CREATE INDEX {} ON {} ({})",
                self.qualified(schema, &index_name),
                self.quote_identifier(table),
                column
            ),
            Dialect::MsSql => format!(
                "CREATE INDEX {} ON {} ({})",
                self.quote_identifier(&index_name),
                self.qualified(schema, table),
                column
            ),
        }
    }

    /// Parameterised insert with one `?` placeholder per column.
    pub fn insert_sql(&self, schema: Option<&str>, table: &str, columns: &[String]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified(schema, table),
            names.join(", "),
            placeholders
        )
    }

    pub fn select_all_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!("SELECT * FROM {}", self.qualified(schema, table))
    }

    pub fn drop_table_sql(&self, schema: Option<&str>, table: &str) -> String {
        format!("DROP TABLE {}", self.qualified(schema, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(Dialect::Sqlite.quote_identifier("my \"t\""), "\"my \"\"t\"\"\"");
        assert_eq!(Dialect::MsSql.quote_identifier("a]b"), "[a]]b]");
        assert_eq!(Dialect::MsSql.qualified(Some("dbo"), "t"), "[dbo].[t]");
        assert_eq!(Dialect::Sqlite.quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_infer_types() {
        assert_eq!(SqlType::infer(&Value::from(1), 255), SqlType::BigInt);
        assert_eq!(SqlType::infer(&Value::from(1.0), 255), SqlType::Float);
        assert_eq!(SqlType::infer(&Value::from(true), 255), SqlType::Boolean);
        assert_eq!(SqlType::infer(&Value::from("x"), 40), SqlType::VarChar(40));
        assert_eq!(SqlType::infer(&Value::Null, 255), SqlType::Text);
    }

    #[test]
    fn test_for_values_skips_leading_nulls() {
        let values = [Value::Null, Value::from(2.5), Value::from(1)];
        assert_eq!(SqlType::for_values(&values, 255), SqlType::Float);
        assert_eq!(SqlType::for_values(&[Value::Null], 255), SqlType::Text);
    }

    #[test]
    fn test_type_names_differ_per_dialect() {
        assert_eq!(Dialect::Sqlite.type_name(SqlType::Boolean), "BOOLEAN");
        assert_eq!(Dialect::MsSql.type_name(SqlType::Boolean), "BIT");
        assert_eq!(Dialect::MsSql.type_name(SqlType::Text), "VARCHAR(max)");
        assert_eq!(Dialect::Sqlite.type_name(SqlType::VarChar(10)), "VARCHAR(10)");
    }

    #[test]
    fn test_sqlite_index_names_do_not_collide() {
        let short = Dialect::Sqlite.index_name("a", "b_c");
        let long = Dialect::Sqlite.index_name("a_b", "c");
        assert_eq!(short, "ix_1_a_b_c");
        assert_eq!(long, "ix_3_a_b_c");
        assert_eq!(Dialect::MsSql.index_name("a", "b_c"), "ix_a_b_c");
    }

    #[test]
    fn test_generated_statements() {
        let columns = vec![
            ("id".to_string(), SqlType::BigInt),
            ("name".to_string(), SqlType::VarChar(255)),
        ];
        assert_eq!(
            Dialect::Sqlite.create_table_sql(None, "people", &columns),
            "CREATE TABLE \"people\" (\"id\" BIGINT, \"name\" VARCHAR(255))"
        );
        assert_eq!(
            Dialect::MsSql.insert_sql(Some("dbo"), "people", &["id".to_string(), "name".to_string()]),
            "INSERT INTO [dbo].[people] ([id], [name]) VALUES (?, ?)"
        );
        assert_eq!(
            Dialect::Sqlite.create_index_sql(Some("aux"), "people", "id"),
            "CREATE INDEX \"aux\".\"ix_6_people_id\" ON \"people\" (\"id\")"
        );
        assert_eq!(
            Dialect::MsSql.create_index_sql(Some("dbo"), "people", "id"),
            "CREATE INDEX [ix_people_id] ON [dbo].[people] ([id])"
        );
        assert_eq!(Dialect::Sqlite.drop_table_sql(None, "t"), "DROP TABLE \"t\"");
    }
}
