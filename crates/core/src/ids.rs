#![forbid(unsafe_code)]

/// Explicit registration key: every step registered under it is recorded in
/// the ledger with this value, and a run can be scoped to a subset of keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, GroupKeyError> {
        let value = value.into();
        validate_group_key(&value)?;
        Ok(Self(value))
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupKeyError {
    Empty,
    TooLong,
    InvalidFirstChar,
    InvalidChar { ch: char, index: usize },
}

impl GroupKeyError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "group key must not be empty",
            Self::TooLong => "group key is too long",
            Self::InvalidFirstChar => "group key must start with an ASCII letter or digit",
            Self::InvalidChar { .. } => "group key contains an unsupported character",
        }
    }
}

impl std::fmt::Display for GroupKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidChar { ch, index } => {
                write!(f, "{} ({ch:?} at {index})", self.message())
            }
            other => f.write_str(other.message()),
        }
    }
}

impl std::error::Error for GroupKeyError {}

const MAX_GROUP_KEY_LEN: usize = 128;

fn validate_group_key(value: &str) -> Result<(), GroupKeyError> {
    if value.is_empty() {
        return Err(GroupKeyError::Empty);
    }
    if value.len() > MAX_GROUP_KEY_LEN {
        return Err(GroupKeyError::TooLong);
    }
    let Some(first) = value.chars().next() else {
        return Err(GroupKeyError::Empty);
    };
    if !first.is_ascii_alphanumeric() {
        return Err(GroupKeyError::InvalidFirstChar);
    }
    for (index, ch) in value.chars().enumerate().skip(1) {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '/' | '-' | ':') {
            continue;
        }
        return Err(GroupKeyError::InvalidChar { ch, index });
    }
    Ok(())
}
