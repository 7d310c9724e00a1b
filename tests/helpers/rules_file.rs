use std::path::{Path, PathBuf};

use georules::rules::{KdlFileBackend, RuleManager};
use tempfile::TempDir;

/// Rules file in a temporary directory, removed on drop
pub struct TestRulesFile {
    path: PathBuf,
    _dir: TempDir,
}

impl TestRulesFile {
    /// Empty location; the file itself is created by the first save
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("rules.kdl");
        Self { path, _dir: dir }
    }

    /// Location pre-filled with `contents`
    pub fn with_contents(contents: &str) -> Self {
        let file = Self::new();
        std::fs::write(&file.path, contents).expect("Failed to write rules file");
        file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh manager over the file, as a restarted process would see it
    pub fn manager(&self) -> RuleManager {
        RuleManager::new(KdlFileBackend::new(&self.path)).expect("Failed to load rules")
    }
}
