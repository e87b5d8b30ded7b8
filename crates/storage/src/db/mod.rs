#![forbid(unsafe_code)]

mod sqlite;

use crate::error::{DbError, MigrateError};
use serde::{Deserialize, Serialize};

/// Bind value or result cell exchanged with a transport.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlRow(pub Vec<SqlValue>);

impl SqlRow {
    pub fn get_i64(&self, index: usize) -> Result<i64, DbError> {
        match self.0.get(index) {
            Some(SqlValue::Integer(value)) => Ok(*value),
            _ => Err(DbError::ColumnType {
                index,
                expected: "integer",
            }),
        }
    }

    pub fn get_opt_i64(&self, index: usize) -> Result<Option<i64>, DbError> {
        match self.0.get(index) {
            Some(SqlValue::Null) => Ok(None),
            _ => self.get_i64(index).map(Some),
        }
    }

    pub fn get_text(&self, index: usize) -> Result<String, DbError> {
        match self.0.get(index) {
            Some(SqlValue::Text(value)) => Ok(value.clone()),
            _ => Err(DbError::ColumnType {
                index,
                expected: "text",
            }),
        }
    }

    /// Text with SQL NULL read as the empty string.
    pub fn get_text_or_empty(&self, index: usize) -> Result<String, DbError> {
        match self.0.get(index) {
            Some(SqlValue::Null) => Ok(String::new()),
            _ => self.get_text(index),
        }
    }
}

/// The execution capability the migrator and the lock are written against.
///
/// Every call blocks the calling thread. `begin` takes `&self` so a lock guard
/// and the critical section it protects can share one handle.
pub trait Database {
    type Tx<'a>: DatabaseTransaction
    where
        Self: 'a;

    fn driver_name(&self) -> &str;

    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError>;

    fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>, DbError>;

    /// Runs `sql` only far enough to know whether it succeeds: prepared and
    /// stepped to its first row, which is then discarded.
    fn probe(&self, sql: &str) -> Result<(), DbError>;

    fn begin(&self) -> Result<Self::Tx<'_>, DbError>;
}

pub trait DatabaseTransaction {
    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError>;

    fn commit(self) -> Result<(), DbError>;

    fn rollback(self) -> Result<(), DbError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
}

/// Supported SQL backends. Adding a backend means adding a variant here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn from_driver_name(name: &str) -> Result<Self, MigrateError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pgx" | "pq" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            _ => Err(MigrateError::UnsupportedDriver(name.to_string())),
        }
    }

    /// The configured dialect, or the one implied by the handle's driver.
    pub fn resolve<D: Database>(configured: Option<Self>, db: &D) -> Result<Self, MigrateError> {
        match configured {
            Some(dialect) => Ok(dialect),
            None => Self::from_driver_name(db.driver_name()),
        }
    }

    pub fn placeholder_style(self) -> PlaceholderStyle {
        match self {
            Self::Sqlite | Self::MySql => PlaceholderStyle::Question,
            Self::Postgres => PlaceholderStyle::Dollar,
        }
    }

    /// Positional parameter marker; `index` is 1-based.
    pub fn placeholder(self, index: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::Dollar => format!("${index}"),
        }
    }

    /// `count` markers starting at `first`, comma separated.
    pub fn placeholders(self, first: usize, count: usize) -> String {
        (first..first + count)
            .map(|index| self.placeholder(index))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Marker for an integer parameter in a position where the type cannot be
    /// inferred from a column, such as an `INSERT ... SELECT` list.
    pub(crate) fn integer_placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}::BIGINT"),
            Self::Sqlite | Self::MySql => self.placeholder(index),
        }
    }

    pub(crate) fn serial_primary_key(self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "BIGSERIAL PRIMARY KEY",
            Self::MySql => "BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY",
        }
    }

    pub(crate) fn supports_index_if_not_exists(self) -> bool {
        !matches!(self, Self::MySql)
    }
}

/// Table names are spliced into statements, so only plain identifiers pass.
pub(crate) fn validate_table_name(name: &str) -> Result<(), MigrateError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(MigrateError::InvalidConfig("table name must not be empty"));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(MigrateError::InvalidConfig(
            "table name must start with a letter or '_'",
        ));
    }
    if name.len() > 63 {
        return Err(MigrateError::InvalidConfig("table name is too long"));
    }
    if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(MigrateError::InvalidConfig(
            "table name may only contain ASCII letters, digits and '_'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_names_map_to_dialects() {
        assert_eq!(Dialect::from_driver_name("sqlite3").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_driver_name("Postgres").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_driver_name("pgx").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_driver_name("mysql").unwrap(), Dialect::MySql);
        assert!(matches!(
            Dialect::from_driver_name("oracle"),
            Err(MigrateError::UnsupportedDriver(name)) if name == "oracle"
        ));
    }

    #[test]
    fn placeholders_follow_dialect_style() {
        assert_eq!(Dialect::Sqlite.placeholders(1, 3), "?, ?, ?");
        assert_eq!(Dialect::MySql.placeholder(4), "?");
        assert_eq!(Dialect::Postgres.placeholders(2, 3), "$2, $3, $4");
        assert_eq!(
            Dialect::Postgres.placeholder_style(),
            PlaceholderStyle::Dollar
        );
    }

    #[test]
    fn table_names_must_be_identifiers() {
        assert!(validate_table_name("mig_recorded_steps").is_ok());
        assert!(validate_table_name("_t1").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("steps; drop table x").is_err());
    }

    #[test]
    fn row_getters_check_types() {
        let row = SqlRow(vec![
            SqlValue::Integer(7),
            SqlValue::Text("x".to_string()),
            SqlValue::Null,
        ]);
        assert_eq!(row.get_i64(0).unwrap(), 7);
        assert_eq!(row.get_text(1).unwrap(), "x");
        assert_eq!(row.get_opt_i64(2).unwrap(), None);
        assert_eq!(row.get_text_or_empty(2).unwrap(), "");
        assert!(matches!(
            row.get_i64(1),
            Err(DbError::ColumnType { index: 1, .. })
        ));
        assert!(row.get_text(5).is_err());
    }
}
