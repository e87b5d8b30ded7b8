#![forbid(unsafe_code)]

mod upgrade;

use crate::db::{Database, DatabaseTransaction, Dialect, SqlRow, SqlValue};
use crate::error::{DbError, MigrateError};
use mig_core::{GroupKey, LedgerEntry, LedgerSnapshot, Step, StepHash};

const COLUMNS: &str = "hash, revert, pkg, ord, name, file, applied_at_ms";

/// The persisted record of applied steps.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Ledger<'a> {
    table: &'a str,
    dialect: Dialect,
}

impl<'a> Ledger<'a> {
    pub(crate) fn new(table: &'a str, dialect: Dialect) -> Self {
        Self { table, dialect }
    }

    /// Creates the table if absent and upgrades older layouts in place.
    pub(crate) fn ensure<D: Database>(&self, db: &D) -> Result<(), MigrateError> {
        let table = self.table;
        db.exec(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n\
                 hash TEXT NOT NULL,\n\
                 revert TEXT NOT NULL,\n\
                 pkg TEXT NOT NULL,\n\
                 name TEXT NOT NULL,\n\
                 file TEXT NOT NULL,\n\
                 applied_at_ms BIGINT NOT NULL,\n\
                 ord BIGINT\n\
                 )"
            ),
            &[],
        )
        .map_err(MigrateError::LedgerInit)?;

        let added = upgrade::apply(db, table, self.dialect).map_err(MigrateError::LedgerInit)?;
        if added > 0 {
            tracing::info!(table, added, "ledger table upgraded");
        }

        self.ensure_order_index(db)
    }

    fn ensure_order_index<D: Database>(&self, db: &D) -> Result<(), MigrateError> {
        let table = self.table;
        if self.dialect.supports_index_if_not_exists() {
            db.exec(
                &format!("CREATE UNIQUE INDEX IF NOT EXISTS {table}_ord_idx ON {table} (ord)"),
                &[],
            )
            .map_err(MigrateError::LedgerInit)?;
        } else if let Err(err) = db.exec(
            &format!("CREATE UNIQUE INDEX {table}_ord_idx ON {table} (ord)"),
            &[],
        ) {
            tracing::debug!(table, error = %err, "order index not created (assumed present)");
        }
        Ok(())
    }

    /// Entries of the selected groups plus every unattributed row; planning
    /// decides which unattributed rows concern this run.
    pub(crate) fn load<D: Database>(
        &self,
        db: &D,
        groups: &[GroupKey],
    ) -> Result<LedgerSnapshot, MigrateError> {
        if groups.is_empty() {
            return Ok(LedgerSnapshot::default());
        }
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE pkg IN ({}) OR pkg = '' ORDER BY ord",
            self.table,
            self.dialect.placeholders(1, groups.len())
        );
        let args = groups
            .iter()
            .map(|group| SqlValue::from(group.as_str()))
            .collect::<Vec<_>>();
        let entries = db
            .query(&sql, &args)
            .and_then(|rows| rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>())
            .map_err(MigrateError::LedgerRead)?;
        Ok(LedgerSnapshot::from_entries(entries))
    }

    /// Entries of every group recorded at or after `order`.
    pub(crate) fn entries_from<D: Database>(
        &self,
        db: &D,
        order: i64,
    ) -> Result<Vec<LedgerEntry>, MigrateError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE ord >= {} ORDER BY ord",
            self.table,
            self.dialect.placeholder(1)
        );
        db.query(&sql, &[SqlValue::Integer(order)])
            .and_then(|rows| rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>())
            .map_err(MigrateError::LedgerRead)
    }

    /// Attributes an unattributed row to the group whose series matched it.
    pub(crate) fn adopt<D: Database>(
        &self,
        db: &D,
        group: &GroupKey,
        order: i64,
    ) -> Result<(), DbError> {
        let sql = format!(
            "UPDATE {} SET pkg = {} WHERE ord = {} AND pkg = ''",
            self.table,
            self.dialect.placeholder(1),
            self.dialect.placeholder(2)
        );
        db.exec(&sql, &[SqlValue::from(group.as_str()), SqlValue::Integer(order)])?;
        Ok(())
    }

    /// Every recorded entry, oldest first.
    pub(crate) fn entries<D: Database>(&self, db: &D) -> Result<Vec<LedgerEntry>, MigrateError> {
        let sql = format!("SELECT {COLUMNS} FROM {} ORDER BY ord", self.table);
        db.query(&sql, &[])
            .and_then(|rows| rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>())
            .map_err(MigrateError::LedgerRead)
    }

    /// Inserts the row for `step` with the next order across all groups.
    ///
    /// Orders are unique among live rows only: once the newest row is
    /// reverted its order is handed out again.
    pub(crate) fn record<T: DatabaseTransaction>(
        &self,
        tx: &T,
        group: &GroupKey,
        step: &Step,
        applied_at_ms: i64,
    ) -> Result<(), DbError> {
        let table = self.table;
        let sql = format!(
            "INSERT INTO {table} (hash, revert, pkg, name, file, applied_at_ms, ord) \
             SELECT {}, {}, COALESCE(MAX(ord), 0) + 1 FROM {table}",
            self.dialect.placeholders(1, 5),
            self.dialect.integer_placeholder(6),
        );
        tx.exec(
            &sql,
            &[
                SqlValue::from(step.hash().as_str()),
                SqlValue::from(step.revert()),
                SqlValue::from(group.as_str()),
                SqlValue::from(step.name()),
                SqlValue::from(step.origin()),
                SqlValue::Integer(applied_at_ms),
            ],
        )?;
        Ok(())
    }

    pub(crate) fn remove<T: DatabaseTransaction>(&self, tx: &T, order: i64) -> Result<(), DbError> {
        let sql = format!(
            "DELETE FROM {} WHERE ord = {}",
            self.table,
            self.dialect.placeholder(1)
        );
        tx.exec(&sql, &[SqlValue::Integer(order)])?;
        Ok(())
    }
}

fn entry_from_row(row: &SqlRow) -> Result<LedgerEntry, DbError> {
    Ok(LedgerEntry {
        hash: StepHash::from_stored(row.get_text(0)?),
        revert: row.get_text_or_empty(1)?,
        group: row.get_text_or_empty(2)?,
        order: row.get_i64(3)?,
        name: row.get_text_or_empty(4)?,
        origin: row.get_text_or_empty(5)?,
        applied_at_ms: row.get_opt_i64(6)?.unwrap_or(0),
    })
}
