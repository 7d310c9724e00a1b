//! Mutation and query API over the rule store.
//!
//! Every mutating operation runs its whole read-modify-write under the store's
//! write lock, and validates its arguments before taking the lock, so a failed
//! call never leaves a partial change behind. Reads share the read lock.
//! `save` holds a dedicated mutex plus the read lock: saves are serialized and
//! no mutation can interleave with serialization.
use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};

use crate::rules::backend::RuleBackend;
use crate::rules::errors::RuleError;
use crate::rules::store::RuleStore;
use crate::rules::types::{role_set, RoleSet, Rule, RuleKey, Upsert};

pub struct RuleManager {
    store: RwLock<RuleStore>,
    save_lock: Mutex<()>,
}

impl RuleManager {
    /// Construct a manager and load the current rule set from `backend`.
    pub fn new(backend: impl RuleBackend + 'static) -> Result<Self, RuleError> {
        let mut store = RuleStore::new(Box::new(backend));
        store.load()?;
        Ok(Self {
            store: RwLock::new(store),
            save_lock: Mutex::new(()),
        })
    }

    /// All rules, keyed by "workspace/layer/method".
    pub fn get_rules(&self) -> BTreeMap<String, Vec<String>> {
        self.store.read().all()
    }

    /// Roles of a single rule, if it exists.
    pub fn get_rule(
        &self,
        workspace: &str,
        layer: Option<&str>,
        method: char,
    ) -> Result<Option<Vec<String>>, RuleError> {
        let key = RuleKey::new(workspace, layer, method)?;
        Ok(self
            .store
            .read()
            .get(&key)
            .map(|roles| roles.iter().cloned().collect()))
    }

    /// Create a rule with exactly `roles`. Fails with [`RuleError::RuleExists`]
    /// when the key is taken, leaving the existing rule untouched.
    pub fn create_rule<S: AsRef<str>>(
        &self,
        workspace: &str,
        layer: Option<&str>,
        method: char,
        roles: &[S],
    ) -> Result<(), RuleError> {
        let key = RuleKey::new(workspace, layer, method)?;
        let roles = non_empty_roles(roles)?;

        let mut store = self.store.write();
        if store.get(&key).is_some() {
            return Err(RuleError::RuleExists { path: key.path() });
        }
        tracing::debug!(rule = %key, ?roles, "Creating rule");
        store.put(Rule::new(key, roles));
        Ok(())
    }

    /// Union `roles` into the rule, creating it when missing.
    pub fn add_to_rule<S: AsRef<str>>(
        &self,
        workspace: &str,
        layer: Option<&str>,
        method: char,
        roles: &[S],
    ) -> Result<Upsert, RuleError> {
        let key = RuleKey::new(workspace, layer, method)?;
        let roles = non_empty_roles(roles)?;

        let mut store = self.store.write();
        Ok(upsert(&mut store, key, roles))
    }

    /// Create the rule, or append to it if it already exists, as one
    /// critical section.
    pub fn create_or_append<S: AsRef<str>>(
        &self,
        workspace: &str,
        layer: Option<&str>,
        method: char,
        roles: &[S],
    ) -> Result<Upsert, RuleError> {
        self.add_to_rule(workspace, layer, method, roles)
    }

    /// Remove `roles` from the rule; the rule is deleted once it has no roles
    /// left. Returns whether a rule was found.
    ///
    /// A missing rule fails with [`RuleError::RuleNotExists`] only when
    /// `fail_if_missing` is set.
    pub fn del_to_rule<S: AsRef<str>>(
        &self,
        workspace: &str,
        layer: Option<&str>,
        method: char,
        roles: &[S],
        fail_if_missing: bool,
    ) -> Result<bool, RuleError> {
        let key = RuleKey::new(workspace, layer, method)?;
        let roles = non_empty_roles(roles)?;

        let mut store = self.store.write();
        let Some(existing) = store.get_mut(&key) else {
            if fail_if_missing {
                return Err(RuleError::RuleNotExists { path: key.path() });
            }
            tracing::debug!(rule = %key, "Rule missing, nothing to remove");
            return Ok(false);
        };

        existing.retain(|role| !roles.contains(role));
        if existing.is_empty() {
            tracing::debug!(rule = %key, "Last role removed, deleting rule");
            store.remove(&key);
        } else {
            tracing::debug!(rule = %key, ?roles, "Removed roles from rule");
        }
        Ok(true)
    }

    /// Delete the whole rule regardless of its roles.
    pub fn delete_rule(
        &self,
        workspace: &str,
        layer: Option<&str>,
        method: char,
    ) -> Result<(), RuleError> {
        let key = RuleKey::new(workspace, layer, method)?;

        let mut store = self.store.write();
        match store.remove(&key) {
            Some(_) => {
                tracing::debug!(rule = %key, "Deleted rule");
                Ok(())
            }
            None => Err(RuleError::RuleNotExists { path: key.path() }),
        }
    }

    /// Flush the current rule set to the backend.
    pub fn save(&self) -> Result<(), RuleError> {
        let _guard = self.save_lock.lock();
        let store = self.store.read();
        store.save()?;
        Ok(())
    }

    /// Re-read the backend, discarding unsaved changes. On error the current
    /// set is kept.
    pub fn reload(&self) -> Result<(), RuleError> {
        self.store.write().load()?;
        Ok(())
    }
}

impl std::fmt::Debug for RuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleManager")
            .field("store", &*self.store.read())
            .finish()
    }
}

fn upsert(store: &mut RuleStore, key: RuleKey, roles: RoleSet) -> Upsert {
    match store.get_mut(&key) {
        Some(existing) => {
            tracing::debug!(rule = %key, ?roles, "Appending roles to rule");
            existing.extend(roles);
            Upsert::Appended
        }
        None => {
            tracing::debug!(rule = %key, ?roles, "Creating rule");
            store.put(Rule::new(key, roles));
            Upsert::Created
        }
    }
}

fn non_empty_roles<S: AsRef<str>>(roles: &[S]) -> Result<RoleSet, RuleError> {
    let roles = role_set(roles);
    if roles.is_empty() {
        return Err(RuleError::InvalidArgument(
            "at least one role is required".into(),
        ));
    }
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::backend::MemoryBackend;
    use std::sync::Arc;

    fn manager() -> RuleManager {
        RuleManager::new(MemoryBackend::new()).unwrap()
    }

    fn roles(m: &RuleManager, ws: &str, layer: Option<&str>, method: char) -> Option<Vec<String>> {
        m.get_rule(ws, layer, method).unwrap()
    }

    #[test]
    fn test_geo_write_scenario() {
        let m = manager();

        m.create_rule("geo", None, 'w', &["ADMIN"]).unwrap();

        let err = m.create_rule("geo", None, 'w', &["ADMIN"]).unwrap_err();
        assert!(matches!(err, RuleError::RuleExists { .. }));

        assert_eq!(
            m.add_to_rule("geo", None, 'w', &["EDITOR"]).unwrap(),
            Upsert::Appended
        );
        assert_eq!(
            roles(&m, "geo", None, 'w').unwrap(),
            vec!["ADMIN".to_string(), "EDITOR".to_string()]
        );

        assert!(m.del_to_rule("geo", None, 'w', &["ADMIN"], true).unwrap());
        assert_eq!(roles(&m, "geo", None, 'w').unwrap(), vec!["EDITOR".to_string()]);

        assert!(m.del_to_rule("geo", None, 'w', &["EDITOR"], true).unwrap());
        assert!(roles(&m, "geo", None, 'w').is_none());
        assert!(m.get_rules().is_empty());

        let err = m.delete_rule("geo", None, 'w').unwrap_err();
        assert!(matches!(err, RuleError::RuleNotExists { .. }));
    }

    #[test]
    fn test_create_existing_does_not_mutate() {
        let m = manager();
        m.create_rule("geo", Some("roads"), 'r', &["VIEWER"]).unwrap();

        assert!(m.create_rule("geo", Some("roads"), 'r', &["OTHER"]).is_err());
        assert_eq!(
            roles(&m, "geo", Some("roads"), 'r').unwrap(),
            vec!["VIEWER".to_string()]
        );
    }

    #[test]
    fn test_create_requires_roles() {
        let m = manager();
        let empty: [&str; 0] = [];
        let err = m.create_rule("geo", None, 'r', &empty).unwrap_err();
        assert!(matches!(err, RuleError::InvalidArgument(_)));

        let err = m.create_rule("geo", None, 'r', &["", " "]).unwrap_err();
        assert!(matches!(err, RuleError::InvalidArgument(_)));
        assert!(m.get_rules().is_empty());
    }

    #[test]
    fn test_create_dedups_roles() {
        let m = manager();
        m.create_rule("geo", None, 'r', &["A", "B", "A"]).unwrap();
        assert_eq!(
            roles(&m, "geo", None, 'r').unwrap(),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn test_invalid_method_rejected() {
        let m = manager();
        let err = m.add_to_rule("geo", None, 'x', &["A"]).unwrap_err();
        assert!(matches!(err, RuleError::InvalidArgument(_)));
        assert!(m.get_rules().is_empty());
    }

    #[test]
    fn test_separator_in_names_rejected() {
        let m = manager();
        m.create_rule("a", Some("c"), 'r', &["Z"]).unwrap();

        let err = m.create_rule("a/b", Some("c"), 'r', &["X"]).unwrap_err();
        assert!(matches!(err, RuleError::InvalidArgument(_)));
        let err = m.add_to_rule("a", Some("b/c"), 'r', &["Y"]).unwrap_err();
        assert!(matches!(err, RuleError::InvalidArgument(_)));

        // every stored rule shows up in the listing
        assert_eq!(m.get_rules().len(), 1);
        assert_eq!(m.get_rules()["a/c/r"], vec!["Z".to_string()]);
    }

    #[test]
    fn test_method_case_normalized() {
        let m = manager();
        m.create_rule("geo", None, 'W', &["A"]).unwrap();
        assert!(roles(&m, "geo", None, 'w').is_some());
        assert!(m.get_rules().contains_key("geo/default/w"));
    }

    #[test]
    fn test_add_creates_when_missing() {
        let m = manager();
        assert_eq!(
            m.add_to_rule("geo", Some("roads"), 'a', &["ROOT", "ROOT"]).unwrap(),
            Upsert::Created
        );
        assert_eq!(
            roles(&m, "geo", Some("roads"), 'a').unwrap(),
            vec!["ROOT".to_string()]
        );
    }

    #[test]
    fn test_add_is_idempotent() {
        let m = manager();
        m.add_to_rule("geo", None, 'r', &["A", "B"]).unwrap();
        m.add_to_rule("geo", None, 'r', &["B"]).unwrap();
        assert_eq!(
            roles(&m, "geo", None, 'r').unwrap(),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn test_create_or_append() {
        let m = manager();
        assert_eq!(
            m.create_or_append("geo", None, 'r', &["A"]).unwrap(),
            Upsert::Created
        );
        assert_eq!(
            m.create_or_append("geo", None, 'r', &["B"]).unwrap(),
            Upsert::Appended
        );
        assert_eq!(roles(&m, "geo", None, 'r').unwrap().len(), 2);
    }

    #[test]
    fn test_empty_layer_is_wildcard() {
        let m = manager();
        m.create_rule("geo", Some(""), 'r', &["A"]).unwrap();
        let err = m.create_rule("geo", None, 'r', &["B"]).unwrap_err();
        assert!(matches!(err, RuleError::RuleExists { .. }));
    }

    #[test]
    fn test_wildcard_and_layer_rules_are_distinct() {
        let m = manager();
        m.create_rule("geo", None, 'r', &["A"]).unwrap();
        m.create_rule("geo", Some("roads"), 'r', &["B"]).unwrap();

        let rules = m.get_rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules["geo/default/r"], vec!["A".to_string()]);
        assert_eq!(rules["geo/roads/r"], vec!["B".to_string()]);
    }

    #[test]
    fn test_del_missing_tolerated() {
        let m = manager();
        assert!(!m.del_to_rule("geo", None, 'r', &["A"], false).unwrap());

        let err = m.del_to_rule("geo", None, 'r', &["A"], true).unwrap_err();
        assert!(matches!(err, RuleError::RuleNotExists { .. }));
        assert_eq!(err.to_string(), "Rule geo/default/r does not exist");
    }

    #[test]
    fn test_del_unknown_role_is_noop() {
        let m = manager();
        m.create_rule("geo", None, 'r', &["A"]).unwrap();
        assert!(m.del_to_rule("geo", None, 'r', &["Z"], true).unwrap());
        assert_eq!(roles(&m, "geo", None, 'r').unwrap(), vec!["A".to_string()]);
    }

    #[test]
    fn test_delete_rule_removes_all_roles() {
        let m = manager();
        m.create_rule("geo", None, 'r', &["A", "B", "C"]).unwrap();
        m.delete_rule("geo", None, 'r').unwrap();
        assert!(roles(&m, "geo", None, 'r').is_none());
    }

    #[test]
    fn test_roles_are_case_sensitive() {
        let m = manager();
        m.create_rule("geo", None, 'r', &["Admin"]).unwrap();
        m.add_to_rule("geo", None, 'r', &["ADMIN"]).unwrap();
        assert_eq!(roles(&m, "geo", None, 'r').unwrap().len(), 2);

        m.del_to_rule("geo", None, 'r', &["admin"], true).unwrap();
        assert_eq!(roles(&m, "geo", None, 'r').unwrap().len(), 2);
    }

    #[test]
    fn test_save_and_reload() {
        let backend = Arc::new(MemoryBackend::new());
        let m = RuleManager::new(backend.clone()).unwrap();
        m.create_rule("geo", None, 'w', &["ADMIN"]).unwrap();
        m.save().unwrap();

        m.add_to_rule("geo", None, 'w', &["EDITOR"]).unwrap();
        assert_eq!(roles(&m, "geo", None, 'w').unwrap().len(), 2);

        // unsaved append is discarded by a reload
        m.reload().unwrap();
        assert_eq!(roles(&m, "geo", None, 'w').unwrap(), vec!["ADMIN".to_string()]);
    }

    #[test]
    fn test_failed_save_keeps_memory() {
        let backend = Arc::new(MemoryBackend::new());
        let m = RuleManager::new(backend.clone()).unwrap();
        m.create_rule("geo", None, 'w', &["ADMIN"]).unwrap();

        backend.set_fail_writes(true);
        let err = m.save().unwrap_err();
        assert!(matches!(err, RuleError::Storage(_)));
        assert_eq!(m.get_rules().len(), 1);
        assert!(backend.persisted().is_empty());
    }

    #[test]
    fn test_new_fails_on_unreadable_backend() {
        let backend = MemoryBackend::new();
        backend.set_fail_reads(true);
        assert!(matches!(
            RuleManager::new(backend),
            Err(RuleError::Storage(_))
        ));
    }
}
