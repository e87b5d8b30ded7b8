#![forbid(unsafe_code)]

use sha2::Digest as _;
use std::fmt::Write as _;

const LINE_COMMENT: &str = "--";

/// Strips blank lines and whole-line `--` comments and trims every remaining
/// line, so cosmetic edits never change a step's identity.
pub fn normalize_sql(sql: &str) -> String {
    sql.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(LINE_COMMENT))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ledger identity of a step: lowercase hex SHA-256 of the normalized
/// forward SQL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepHash(String);

impl StepHash {
    pub fn of_normalized(sql: &str) -> Self {
        let digest = sha2::Sha256::digest(sql.as_bytes());
        let mut out = String::with_capacity(64);
        for b in digest {
            let _ = write!(&mut out, "{:02x}", b);
        }
        Self(out)
    }

    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for StepHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    name: String,
    forward: String,
    revert: String,
    prerequisite: String,
    origin: String,
    hash: StepHash,
}

impl Step {
    pub fn new(forward: impl AsRef<str>) -> Self {
        let forward = normalize_sql(forward.as_ref());
        let hash = StepHash::of_normalized(&forward);
        Self {
            name: String::new(),
            forward,
            revert: String::new(),
            prerequisite: String::new(),
            origin: String::new(),
            hash,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_revert(mut self, revert: impl AsRef<str>) -> Self {
        self.revert = normalize_sql(revert.as_ref());
        self
    }

    pub fn with_prerequisite(mut self, prerequisite: impl AsRef<str>) -> Self {
        self.prerequisite = normalize_sql(prerequisite.as_ref());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn forward(&self) -> &str {
        &self.forward
    }

    pub fn revert(&self) -> &str {
        &self.revert
    }

    pub fn prerequisite(&self) -> Option<&str> {
        if self.prerequisite.is_empty() {
            None
        } else {
            Some(&self.prerequisite)
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn hash(&self) -> &StepHash {
        &self.hash
    }

    pub(crate) fn fill_default_name(&mut self, index: usize) {
        if self.name.trim().is_empty() {
            self.name = format!("unnamed-{index}");
        }
    }
}
