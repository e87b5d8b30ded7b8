#![forbid(unsafe_code)]

use mig_core::{BlockedStep, RegistryError, StepHash};
use std::time::Duration;

/// Failure reported by a database transport.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("column {index}: expected {expected}")]
    ColumnType { index: usize, expected: &'static str },
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl DbError {
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(err))
    }

    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(code, message)) => {
                code.code == rusqlite::ErrorCode::ConstraintViolation
                    || message.as_deref().is_some_and(|value| {
                        value.contains("UNIQUE constraint failed")
                            || value.contains("PRIMARY KEY constraint failed")
                    })
            }
            Self::Other(err) => {
                let text = err.to_string().to_ascii_lowercase();
                text.contains("unique") || text.contains("duplicate")
            }
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("unsupported database driver: {0}")]
    UnsupportedDriver(String),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("ledger table could not be created or upgraded: {0}")]
    LedgerInit(#[source] DbError),
    #[error("ledger table could not be read: {0}")]
    LedgerRead(#[source] DbError),
    #[error("step {group}/{name} failed (origin: {origin}): {source}\nsql: `{sql}`")]
    StepExecution {
        group: String,
        name: String,
        origin: String,
        sql: String,
        #[source]
        source: DbError,
    },
    #[error("step {name} ran but could not be recorded in the ledger: {source}")]
    LedgerWrite {
        name: String,
        #[source]
        source: DbError,
    },
    #[error("unable to make progress on migrations: {}", describe_blocked(.blocked))]
    Stalled { blocked: Vec<BlockedStep> },
    #[error("revert of {name} (order {order}) failed: {source}")]
    Revert {
        name: String,
        order: i64,
        #[source]
        source: DbError,
    },
    #[error("forward-only mode refuses to revert {} recorded step(s): {}", .hashes.len(), describe_hashes(.hashes))]
    ForwardOnlyViolation { hashes: Vec<StepHash> },
    #[error("database lock not acquired within {waited:?}")]
    LockTimeout { waited: Duration },
}

fn describe_blocked(blocked: &[BlockedStep]) -> String {
    blocked
        .iter()
        .map(|step| format!("\n\t{step}"))
        .collect::<String>()
}

fn describe_hashes(hashes: &[StepHash]) -> String {
    hashes
        .iter()
        .map(|hash| hash.short())
        .collect::<Vec<_>>()
        .join(", ")
}
