#![forbid(unsafe_code)]

use crate::config::MigratorConfig;
use crate::db::{Database, DatabaseTransaction, Dialect, validate_table_name};
use crate::error::{DbError, MigrateError};
use crate::ledger::Ledger;
use mig_core::{BlockedStep, GroupKey, LedgerEntry, Registry, Series, Step, plan_reverts};

/// What a run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Steps found in the ledger and left alone.
    pub already_applied: usize,
    pub reverted: usize,
    pub applied: usize,
    pub passes: usize,
}

impl RunReport {
    pub fn is_noop(&self) -> bool {
        self.reverted == 0 && self.applied == 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct Migrator {
    config: MigratorConfig,
}

impl Migrator {
    pub fn new(config: MigratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Brings the database in line with the registered steps of `groups`
    /// (every registered group when empty).
    ///
    /// The run does not take the database lock; callers sharing a database
    /// across processes wrap it in [`crate::DatabaseLock::with_lock`].
    pub fn run<D: Database>(
        &self,
        db: &D,
        registry: &Registry,
        groups: &[GroupKey],
    ) -> Result<RunReport, MigrateError> {
        let ledger = self.ledger(db)?;
        let mut series = registry.build_series(groups)?;

        ledger.ensure(db)?;
        let snapshot = ledger.load(db, &registry.resolve_groups(groups))?;
        let mut plan = plan_reverts(&mut series, snapshot);
        let outside = match plan.boundary {
            Some(boundary) => plan.absorb(ledger.entries_from(db, boundary)?),
            None => 0,
        };

        let mut report = RunReport {
            already_applied: plan.already_applied,
            ..RunReport::default()
        };

        if !plan.is_empty() && self.config.forward_only {
            return Err(MigrateError::ForwardOnlyViolation {
                hashes: plan.hashes(),
            });
        }

        adopt_unattributed(db, &ledger, &series)?;

        if !plan.is_empty() {
            if outside > 0 {
                tracing::warn!(
                    count = outside,
                    "reverting later steps outside this run; a run selecting their groups reapplies them"
                );
            }
            tracing::info!(
                boundary = plan.boundary,
                count = plan.entries.len(),
                "reverting steps that no longer match the registered sequence"
            );
            report.reverted = apply_reverts(db, &ledger, &plan.entries)?;
        }

        let (applied, passes) = drive(db, &ledger, &mut series)?;
        report.applied = applied;
        report.passes = passes;

        tracing::info!(
            already_applied = report.already_applied,
            reverted = report.reverted,
            applied = report.applied,
            passes = report.passes,
            "migrations complete"
        );
        Ok(report)
    }

    /// Every ledger row, in application order.
    pub fn recorded<D: Database>(&self, db: &D) -> Result<Vec<LedgerEntry>, MigrateError> {
        let ledger = self.ledger(db)?;
        ledger.ensure(db)?;
        ledger.entries(db)
    }

    fn ledger<D: Database>(&self, db: &D) -> Result<Ledger<'_>, MigrateError> {
        let dialect = Dialect::resolve(self.config.dialect, db)?;
        validate_table_name(&self.config.ledger_table)?;
        Ok(Ledger::new(&self.config.ledger_table, dialect))
    }
}

/// [`Migrator::run`] with the default configuration.
pub fn run<D: Database>(
    db: &D,
    registry: &Registry,
    groups: &[GroupKey],
) -> Result<RunReport, MigrateError> {
    Migrator::default().run(db, registry, groups)
}

/// Writes each series' group into the unattributed rows it matched.
fn adopt_unattributed<D: Database>(
    db: &D,
    ledger: &Ledger<'_>,
    series: &[Series],
) -> Result<(), MigrateError> {
    for one in series {
        for entry in one.matched().filter(|entry| entry.is_unattributed()) {
            ledger
                .adopt(db, one.group(), entry.order)
                .map_err(|source| MigrateError::LedgerWrite {
                    name: entry.name.clone(),
                    source,
                })?;
            tracing::debug!(group = %one.group(), order = entry.order, "attributed ledger row");
        }
    }
    Ok(())
}

/// Undoes `entries`, which must already be sorted by descending order. Each
/// entry is removed from the ledger and reverted in its own transaction; the
/// sequence as a whole is not atomic.
fn apply_reverts<D: Database>(
    db: &D,
    ledger: &Ledger<'_>,
    entries: &[LedgerEntry],
) -> Result<usize, MigrateError> {
    debug_assert!(entries.windows(2).all(|pair| pair[0].order > pair[1].order));

    for entry in entries {
        let failed = |source: DbError| MigrateError::Revert {
            name: entry.name.clone(),
            order: entry.order,
            source,
        };

        tracing::info!(
            group = %entry.group,
            step = %entry.name,
            order = entry.order,
            hash = entry.hash.short(),
            "reverting step"
        );
        let tx = db.begin().map_err(failed)?;
        if let Err(source) = ledger.remove(&tx, entry.order) {
            abort(tx);
            return Err(failed(source));
        }
        if !entry.revert.is_empty() {
            if let Err(source) = tx.exec(&entry.revert, &[]) {
                abort(tx);
                return Err(failed(source));
            }
        }
        tx.commit().map_err(failed)?;
    }
    Ok(entries.len())
}

/// Runs passes until every series is done. A pass in which no series moves
/// is a stall.
fn drive<D: Database>(
    db: &D,
    ledger: &Ledger<'_>,
    series: &mut [Series],
) -> Result<(usize, usize), MigrateError> {
    let mut applied = 0usize;
    let mut passes = 0usize;

    loop {
        if series.iter().all(Series::is_done) {
            return Ok((applied, passes));
        }

        passes += 1;
        let mut progressed = false;
        for one in series.iter_mut().filter(|one| !one.is_done()) {
            let count = advance_series(db, ledger, one)?;
            if count > 0 {
                progressed = true;
                applied += count;
            }
        }
        tracing::debug!(pass = passes, applied, progressed, "pass finished");

        if !progressed {
            return Err(MigrateError::Stalled {
                blocked: blocked_steps(series),
            });
        }
    }
}

/// Applies steps from the cursor until the series ends or a prerequisite
/// does not hold yet. Returns the number of steps applied.
fn advance_series<D: Database>(
    db: &D,
    ledger: &Ledger<'_>,
    series: &mut Series,
) -> Result<usize, MigrateError> {
    let mut applied = 0usize;
    while let Some(step) = series.current() {
        if let Some(prerequisite) = step.prerequisite() {
            if let Err(err) = db.probe(prerequisite) {
                tracing::debug!(
                    group = %series.group(),
                    step = step.name(),
                    error = %err,
                    "prerequisite not satisfied yet"
                );
                break;
            }
        }
        apply_step(db, ledger, series.group(), step)?;
        series.advance();
        applied += 1;
    }
    Ok(applied)
}

fn apply_step<D: Database>(
    db: &D,
    ledger: &Ledger<'_>,
    group: &GroupKey,
    step: &Step,
) -> Result<(), MigrateError> {
    let execution_failed = |source: DbError| MigrateError::StepExecution {
        group: group.as_str().to_string(),
        name: step.name().to_string(),
        origin: step.origin().to_string(),
        sql: step.forward().to_string(),
        source,
    };
    let write_failed = |source: DbError| MigrateError::LedgerWrite {
        name: step.name().to_string(),
        source,
    };

    tracing::info!(
        group = %group,
        step = step.name(),
        hash = step.hash().short(),
        "applying step"
    );
    let tx = db.begin().map_err(execution_failed)?;
    if let Err(source) = tx.exec(step.forward(), &[]) {
        abort(tx);
        return Err(execution_failed(source));
    }
    if let Err(source) = ledger.record(&tx, group, step, now_ms()) {
        abort(tx);
        return Err(write_failed(source));
    }
    tx.commit().map_err(write_failed)
}

fn abort<T: DatabaseTransaction>(tx: T) {
    if let Err(err) = tx.rollback() {
        tracing::warn!(error = %err, "rollback failed");
    }
}

fn blocked_steps(series: &[Series]) -> Vec<BlockedStep> {
    series.iter().filter_map(Series::blocked_step).collect()
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
