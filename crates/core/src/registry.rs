#![forbid(unsafe_code)]

use crate::ids::GroupKey;
use crate::series::Series;
use crate::step::{Step, StepHash};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
struct Registration {
    group: GroupKey,
    steps: Vec<Step>,
}

/// Caller-owned collection of step sequences awaiting a run.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    registrations: Vec<Registration>,
    known: BTreeMap<StepHash, (GroupKey, String)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an ordered step list under `group`. A group may be registered
    /// several times; each registration becomes its own series.
    pub fn register(
        &mut self,
        group: GroupKey,
        mut steps: Vec<Step>,
    ) -> Result<(), RegistryError> {
        let mut seen = BTreeMap::new();
        for (index, step) in steps.iter_mut().enumerate() {
            step.fill_default_name(index);
            if step.forward().is_empty() {
                return Err(RegistryError::EmptyStep {
                    group: group.into_string(),
                    name: step.name().to_string(),
                });
            }
            let owner = self
                .known
                .get(step.hash())
                .map(|(owner, name)| (owner.as_str().to_string(), name.clone()))
                .or_else(|| {
                    seen.get(step.hash())
                        .map(|name: &String| (group.as_str().to_string(), name.clone()))
                });
            if let Some((first_group, first_name)) = owner {
                return Err(RegistryError::DuplicateStep {
                    hash: step.hash().clone(),
                    first_group,
                    first_name,
                    group: group.into_string(),
                    name: step.name().to_string(),
                });
            }
            seen.insert(step.hash().clone(), step.name().to_string());
        }

        for step in &steps {
            self.known
                .insert(step.hash().clone(), (group.clone(), step.name().to_string()));
        }
        self.registrations.push(Registration { group, steps });
        Ok(())
    }

    /// Distinct group keys in first-registration order.
    pub fn groups(&self) -> Vec<&GroupKey> {
        let mut out: Vec<&GroupKey> = Vec::new();
        for registration in &self.registrations {
            if !out.contains(&&registration.group) {
                out.push(&registration.group);
            }
        }
        out
    }

    /// Fresh series for the selected groups (every group when `selected` is
    /// empty). Steps are cloned so a run never mutates registered state.
    pub fn build_series(&self, selected: &[GroupKey]) -> Result<Vec<Series>, RegistryError> {
        for group in selected {
            if !self.registrations.iter().any(|r| &r.group == group) {
                return Err(RegistryError::UnknownGroup(group.as_str().to_string()));
            }
        }

        Ok(self
            .registrations
            .iter()
            .filter(|r| selected.is_empty() || selected.contains(&r.group))
            .map(|r| Series::new(r.group.clone(), r.steps.clone()))
            .collect())
    }

    /// The group keys a run over `selected` will touch.
    pub fn resolve_groups(&self, selected: &[GroupKey]) -> Vec<GroupKey> {
        if selected.is_empty() {
            self.groups().into_iter().cloned().collect()
        } else {
            selected.to_vec()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    EmptyStep {
        group: String,
        name: String,
    },
    DuplicateStep {
        hash: StepHash,
        first_group: String,
        first_name: String,
        group: String,
        name: String,
    },
    UnknownGroup(String),
}

impl RegistryError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::EmptyStep { .. } => "step has no forward sql",
            Self::DuplicateStep { .. } => "step is already registered",
            Self::UnknownGroup(_) => "group key was never registered",
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyStep { group, name } => {
                write!(f, "{} (group={group}, step={name})", self.message())
            }
            Self::DuplicateStep {
                hash,
                first_group,
                first_name,
                group,
                name,
            } => write!(
                f,
                "{} (hash={}, first={first_group}/{first_name}, again={group}/{name})",
                self.message(),
                hash.short()
            ),
            Self::UnknownGroup(group) => write!(f, "{} (group={group})", self.message()),
        }
    }
}

impl std::error::Error for RegistryError {}
