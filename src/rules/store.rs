use std::collections::BTreeMap;

use crate::rules::backend::RuleBackend;
use crate::rules::errors::StorageError;
use crate::rules::types::{RoleSet, Rule, RuleKey, RuleSet};

/// In-memory rule set backed by a persistence adapter.
///
/// The store does no locking of its own; [`RuleManager`](crate::rules::manager::RuleManager)
/// owns it behind a lock.
pub struct RuleStore {
    rules: RuleSet,
    backend: Box<dyn RuleBackend>,
}

impl RuleStore {
    /// An empty store. Call [`load`](Self::load) to populate it.
    pub fn new(backend: Box<dyn RuleBackend>) -> Self {
        Self {
            rules: RuleSet::new(),
            backend,
        }
    }

    /// Replace the in-memory set with the backend's content. On error the
    /// current set is kept.
    pub fn load(&mut self) -> Result<(), StorageError> {
        self.rules = self.backend.read()?;
        if self.is_empty() {
            tracing::info!(backend = %self.backend.describe(), "No access rules defined yet");
        } else {
            tracing::info!(
                rules = self.len(),
                backend = %self.backend.describe(),
                "Loaded access rules"
            );
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), StorageError> {
        self.backend.write(&self.rules)?;
        tracing::debug!(
            rules = self.len(),
            backend = %self.backend.describe(),
            "Saved access rules"
        );
        Ok(())
    }

    pub fn get(&self, key: &RuleKey) -> Option<&RoleSet> {
        self.rules.get(key)
    }

    pub fn get_mut(&mut self, key: &RuleKey) -> Option<&mut RoleSet> {
        self.rules.get_mut(key)
    }

    pub fn put(&mut self, rule: Rule) {
        self.rules.insert(rule.key, rule.roles);
    }

    pub fn remove(&mut self, key: &RuleKey) -> Option<RoleSet> {
        self.rules.remove(key)
    }

    /// Snapshot keyed by rendered rule path, roles sorted.
    pub fn all(&self) -> BTreeMap<String, Vec<String>> {
        self.rules
            .iter()
            .map(|(key, roles)| (key.path(), roles.iter().cloned().collect()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("rules", &self.rules.len())
            .field("backend", &self.backend.describe())
            .finish()
    }
}
