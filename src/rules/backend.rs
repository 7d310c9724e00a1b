//! Persistence adapters for the rule set.
//!
//! A backend only knows how to read and write a whole [`RuleSet`]; it holds
//! no in-memory view of its own that the store relies on. Two backends ship
//! with the crate:
//! - [`MemoryBackend`]: not durable, used by tests and throwaway setups. Its
//!   reads and writes can be made to fail to exercise storage error paths.
//! - [`KdlFileBackend`](crate::rules::kdl_file::KdlFileBackend): a single KDL
//!   file on disk.
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::rules::errors::StorageError;
use crate::rules::types::RuleSet;

pub trait RuleBackend: Send + Sync {
    /// Read the complete persisted rule set.
    fn read(&self) -> Result<RuleSet, StorageError>;

    /// Replace the persisted rule set with `rules`.
    fn write(&self, rules: &RuleSet) -> Result<(), StorageError>;

    /// Human-readable location for log lines.
    fn describe(&self) -> String;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    rules: Mutex<RuleSet>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: RuleSet) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Self::default()
        }
    }

    /// Make subsequent reads fail with [`StorageError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with [`StorageError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// What was last written (or seeded).
    pub fn persisted(&self) -> RuleSet {
        self.rules.lock().clone()
    }
}

impl RuleBackend for MemoryBackend {
    fn read(&self) -> Result<RuleSet, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory backend read disabled".into()));
        }
        Ok(self.rules.lock().clone())
    }

    fn write(&self, rules: &RuleSet) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory backend write disabled".into(),
            ));
        }
        *self.rules.lock() = rules.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Shared backends can be handed to a manager while the caller keeps a
/// handle for inspection.
impl<B: RuleBackend + ?Sized> RuleBackend for std::sync::Arc<B> {
    fn read(&self) -> Result<RuleSet, StorageError> {
        (**self).read()
    }

    fn write(&self, rules: &RuleSet) -> Result<(), StorageError> {
        (**self).write(rules)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
