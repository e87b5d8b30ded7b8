#![forbid(unsafe_code)]

use crate::db::Dialect;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_LEDGER_TABLE: &str = "mig_recorded_steps";
pub const DEFAULT_LOCK_TABLE: &str = "mig_database_lock";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    pub ledger_table: String,
    /// Refuse any run that would need to revert a recorded step.
    pub forward_only: bool,
    /// When unset the dialect is derived from the handle's driver name.
    pub dialect: Option<Dialect>,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            forward_only: false,
            dialect: None,
        }
    }
}

impl MigratorConfig {
    /// Defaults overridden by `MIG_LEDGER_TABLE` and `MIG_FORWARD_ONLY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(table) = std::env::var("MIG_LEDGER_TABLE") {
            let table = table.trim();
            if !table.is_empty() {
                config.ledger_table = table.to_string();
            }
        }
        if let Ok(flag) = std::env::var("MIG_FORWARD_ONLY") {
            config.forward_only = parse_flag(&flag);
        }
        config
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn forward_only(mut self, forward_only: bool) -> Self {
        self.forward_only = forward_only;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub table: String,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    pub release_retry_ms: u64,
    pub dialect: Option<Dialect>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_LOCK_TABLE.to_string(),
            backoff_min_ms: 500,
            backoff_max_ms: 1500,
            release_retry_ms: 100,
            dialect: None,
        }
    }
}

impl LockConfig {
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        self.backoff_max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub(crate) fn backoff_range(&self) -> (u64, u64) {
        let low = self.backoff_min_ms.min(self.backoff_max_ms);
        let high = self.backoff_min_ms.max(self.backoff_max_ms);
        (low, high)
    }

    pub(crate) fn release_retry(&self) -> Duration {
        Duration::from_millis(self.release_retry_ms.max(1))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
