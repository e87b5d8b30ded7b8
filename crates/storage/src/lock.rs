#![forbid(unsafe_code)]

use crate::config::LockConfig;
use crate::db::{Database, Dialect, SqlValue, validate_table_name};
use crate::error::{DbError, MigrateError};
use rand::Rng as _;
use std::time::{Duration, Instant};

/// Cross-process mutual exclusion built on a uniquely constrained row.
///
/// At most one row with `lock_row = 1` can exist, so at most one caller per
/// database runs its critical section at a time, whatever process it lives in.
#[derive(Clone, Debug, Default)]
pub struct DatabaseLock {
    config: LockConfig,
}

impl DatabaseLock {
    pub fn new(config: LockConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Runs `critical` while holding the lock. Gives up with
    /// [`MigrateError::LockTimeout`] once `timeout` has elapsed without
    /// acquiring it, in which case `critical` never runs. The lock is released
    /// however `critical` ends, including by panic.
    pub fn with_lock<D, T, E, F>(&self, db: &D, timeout: Duration, critical: F) -> Result<T, E>
    where
        D: Database,
        F: FnOnce() -> Result<T, E>,
        E: From<MigrateError>,
    {
        let _guard = self.acquire(db, timeout)?;
        critical()
    }

    fn acquire<'d, D: Database>(
        &self,
        db: &'d D,
        timeout: Duration,
    ) -> Result<LockGuard<'d, D>, MigrateError> {
        let dialect = Dialect::resolve(self.config.dialect, db)?;
        validate_table_name(&self.config.table)?;
        let table = self.config.table.as_str();

        // A concurrent creator may win this race; the insert below is the
        // real test of whether the table is usable.
        if let Err(err) = db.exec(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (id {}, lock_row INT, UNIQUE (lock_row))",
                dialect.serial_primary_key()
            ),
            &[],
        ) {
            tracing::warn!(table, error = %err, "could not create lock table");
        }

        let insert = format!("INSERT INTO {table} (lock_row) VALUES (1)");
        let (low, high) = self.config.backoff_range();
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match db.exec(&insert, &[]) {
                Ok(_) => match held_row_id(db, table) {
                    Ok(id) => {
                        tracing::debug!(table, id, attempts, "database lock acquired");
                        return Ok(LockGuard {
                            db,
                            delete: format!("DELETE FROM {table} WHERE id = {}", dialect.placeholder(1)),
                            id,
                            retry: self.config.release_retry(),
                        });
                    }
                    Err(err) => {
                        tracing::warn!(table, error = %err, "lock row inserted but its id could not be read");
                        release_by_row(db, table);
                    }
                },
                Err(err) if err.is_constraint_violation() => {
                    tracing::debug!(table, attempts, "database lock is held elsewhere");
                }
                Err(err) => {
                    tracing::warn!(table, attempts, error = %err, "lock insert failed");
                }
            }

            let waited = start.elapsed();
            if waited > timeout {
                return Err(MigrateError::LockTimeout { waited });
            }
            let pause = rand::thread_rng().gen_range(low..=high);
            std::thread::sleep(Duration::from_millis(pause));
        }
    }
}

fn held_row_id<D: Database>(db: &D, table: &str) -> Result<i64, DbError> {
    let rows = db.query(&format!("SELECT id FROM {table} WHERE lock_row = 1"), &[])?;
    match rows.first() {
        Some(row) => row.get_i64(0),
        None => Err(DbError::ColumnType {
            index: 0,
            expected: "lock row id",
        }),
    }
}

fn release_by_row<D: Database>(db: &D, table: &str) {
    if let Err(err) = db.exec(&format!("DELETE FROM {table} WHERE lock_row = 1"), &[]) {
        tracing::warn!(table, error = %err, "could not drop unidentified lock row");
    }
}

struct LockGuard<'d, D: Database> {
    db: &'d D,
    delete: String,
    id: i64,
    retry: Duration,
}

impl<D: Database> Drop for LockGuard<'_, D> {
    // An unreleased row blocks every future caller, so this retries until the
    // delete goes through.
    fn drop(&mut self) {
        loop {
            match self.db.exec(&self.delete, &[SqlValue::Integer(self.id)]) {
                Ok(_) => {
                    tracing::debug!(id = self.id, "database lock released");
                    return;
                }
                Err(err) => {
                    tracing::warn!(id = self.id, error = %err, "error releasing database lock; retrying");
                    std::thread::sleep(self.retry);
                }
            }
        }
    }
}
