#![forbid(unsafe_code)]

mod config;
mod db;
mod error;
mod ledger;
mod lock;
mod migrator;

pub use config::*;
pub use db::{Database, DatabaseTransaction, Dialect, PlaceholderStyle, SqlRow, SqlValue};
pub use error::*;
pub use lock::DatabaseLock;
pub use migrator::{Migrator, RunReport, run};

pub use mig_core::{
    BlockedStep, GroupKey, GroupKeyError, LedgerEntry, Registry, RegistryError, Step, StepHash,
    normalize_sql,
};
