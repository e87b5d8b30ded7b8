#![forbid(unsafe_code)]

use super::{Database, DatabaseTransaction, SqlRow, SqlValue};
use crate::error::DbError;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Transaction, params_from_iter};

impl Database for Connection {
    type Tx<'a> = Transaction<'a>;

    fn driver_name(&self) -> &str {
        "sqlite3"
    }

    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        exec_on(self, sql, args)
    }

    fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>, DbError> {
        query_on(self, sql, args)
    }

    fn probe(&self, sql: &str) -> Result<(), DbError> {
        let mut stmt = self.prepare(sql)?;
        let mut rows = stmt.query([])?;
        rows.next()?;
        Ok(())
    }

    fn begin(&self) -> Result<Self::Tx<'_>, DbError> {
        Ok(self.unchecked_transaction()?)
    }
}

impl DatabaseTransaction for Transaction<'_> {
    fn exec(&self, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
        exec_on(self, sql, args)
    }

    fn commit(self) -> Result<(), DbError> {
        Ok(Transaction::commit(self)?)
    }

    fn rollback(self) -> Result<(), DbError> {
        Ok(Transaction::rollback(self)?)
    }
}

// Argument-free statements go through `execute_batch` so a single step may
// carry several statements.
fn exec_on(conn: &Connection, sql: &str, args: &[SqlValue]) -> Result<usize, DbError> {
    if args.is_empty() {
        conn.execute_batch(sql)?;
        return Ok(usize::try_from(conn.changes()).unwrap_or(usize::MAX));
    }
    Ok(conn.execute(sql, params_from_iter(args.iter().map(to_value)))?)
}

fn query_on(conn: &Connection, sql: &str, args: &[SqlValue]) -> Result<Vec<SqlRow>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(args.iter().map(to_value)))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(columns);
        for index in 0..columns {
            cells.push(from_value_ref(row.get_ref(index)?));
        }
        out.push(SqlRow(cells));
    }
    Ok(out)
}

fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Blob(v) => Value::Blob(v.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
    }
}
