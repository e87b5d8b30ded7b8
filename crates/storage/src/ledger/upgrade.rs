#![forbid(unsafe_code)]

use crate::db::{Database, Dialect, SqlValue};
use crate::error::DbError;

/// Columns added after the first ledger layout, with the declarations used
/// to backfill existing rows.
const ADDED_COLUMNS: &[(&str, &str)] = &[
    ("revert", "TEXT NOT NULL DEFAULT ''"),
    ("pkg", "TEXT NOT NULL DEFAULT ''"),
    ("name", "TEXT NOT NULL DEFAULT ''"),
    ("file", "TEXT NOT NULL DEFAULT ''"),
    ("applied_at_ms", "BIGINT NOT NULL DEFAULT 0"),
    ("ord", "BIGINT"),
];

pub(super) fn apply<D: Database>(db: &D, table: &str, dialect: Dialect) -> Result<usize, DbError> {
    let mut added = 0usize;
    for (column, decl) in ADDED_COLUMNS {
        if add_column_if_missing(db, table, column, decl)? {
            added += 1;
        }
    }
    backfill_order(db, table, dialect)?;
    Ok(added)
}

pub(super) fn add_column_if_missing<D: Database>(
    db: &D,
    table: &str,
    column: &str,
    decl: &str,
) -> Result<bool, DbError> {
    let probe = format!("SELECT {column} FROM {table} WHERE 1 = 0");
    if db.probe(&probe).is_ok() {
        return Ok(false);
    }
    tracing::info!(table, column, "adding missing ledger column");
    db.exec(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), &[])?;
    Ok(true)
}

/// Rows recorded before the order column existed get orders after every
/// ordered row, oldest first.
fn backfill_order<D: Database>(db: &D, table: &str, dialect: Dialect) -> Result<(), DbError> {
    let pending = db.query(
        &format!("SELECT hash FROM {table} WHERE ord IS NULL ORDER BY applied_at_ms, hash"),
        &[],
    )?;
    if pending.is_empty() {
        return Ok(());
    }

    let max = db
        .query(&format!("SELECT COALESCE(MAX(ord), 0) FROM {table}"), &[])?
        .first()
        .map(|row| row.get_i64(0))
        .transpose()?
        .unwrap_or(0);

    tracing::info!(table, rows = pending.len(), "backfilling ledger order");
    let update = format!(
        "UPDATE {table} SET ord = {} WHERE hash = {} AND ord IS NULL",
        dialect.placeholder(1),
        dialect.placeholder(2)
    );
    let mut next = max;
    for row in pending {
        let hash = row.get_text(0)?;
        next += 1;
        db.exec(&update, &[SqlValue::Integer(next), SqlValue::Text(hash)])?;
    }
    Ok(())
}
