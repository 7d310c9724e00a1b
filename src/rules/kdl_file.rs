use std::io::Write;
use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlEntry, KdlNode};

use crate::rules::backend::RuleBackend;
use crate::rules::errors::StorageError;
use crate::rules::types::*;

/// Rules persisted as a single KDL document on disk.
///
/// ```kdl
/// rule "geo" method="w" {
///     - "ADMIN"
/// }
/// rule "geo" layer="roads" method="r" {
///     - "VIEWER"
/// }
/// ```
#[derive(Debug, Clone)]
pub struct KdlFileBackend {
    path: PathBuf,
}

impl KdlFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path().display().to_string(),
            source,
        }
    }
}

impl RuleBackend for KdlFileBackend {
    fn read(&self) -> Result<RuleSet, StorageError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "Rules file not found, starting empty");
                return Ok(RuleSet::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        parse_rules_document(&contents)
    }

    fn write(&self, rules: &RuleSet) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        // Write next to the target and rename, so readers never see a half-written file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let written = write_synced(&tmp, render_rules_document(rules).as_bytes());
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(self.io_error(e));
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            self.io_error(e)
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }
}

/// Write `contents` and flush them to disk before returning.
fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Parse a KDL rules document into a rule set.
pub fn parse_rules_document(source: &str) -> Result<RuleSet, StorageError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| StorageError::KdlParse(e.to_string()))?;

    let mut rules = RuleSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "rule" => {
                let workspace = first_string_arg(node).ok_or_else(|| {
                    StorageError::InvalidDocument(
                        "rule node requires a workspace argument (e.g. rule \"geo\" method=\"r\")"
                            .into(),
                    )
                })?;

                let layer = node.get("layer").and_then(|v| v.as_string());

                let method = node
                    .get("method")
                    .and_then(|v| v.as_string())
                    .ok_or_else(|| {
                        StorageError::InvalidDocument(format!(
                            "rule `{workspace}` missing `method` property (e.g. method=\"w\")"
                        ))
                    })?;
                let mut chars = method.chars();
                let code = match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => {
                        return Err(StorageError::InvalidDocument(format!(
                            "rule `{workspace}` has invalid method `{method}` (expected r, w or a)"
                        )))
                    }
                };

                let key = RuleKey::new(&workspace, layer, code)
                    .map_err(|e| StorageError::InvalidDocument(e.to_string()))?;

                let roles = role_set(dash_list(node));
                if roles.is_empty() {
                    return Err(StorageError::InvalidDocument(format!(
                        "rule `{key}` has no roles"
                    )));
                }

                if rules.contains_key(&key) {
                    return Err(StorageError::InvalidDocument(format!(
                        "rule `{key}` is defined more than once"
                    )));
                }
                rules.insert(key, roles);
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(rules)
}

/// Render a rule set as a KDL document, one `rule` node per key.
pub fn render_rules_document(rules: &RuleSet) -> String {
    let mut doc = KdlDocument::new();

    for (key, roles) in rules {
        let mut node = KdlNode::new("rule");
        node.entries_mut().push(KdlEntry::new(key.workspace.clone()));
        if let Some(layer) = key.layer.as_layer() {
            node.entries_mut()
                .push(KdlEntry::new_prop("layer", layer.to_string()));
        }
        node.entries_mut()
            .push(KdlEntry::new_prop("method", key.method.code().to_string()));

        let mut children = KdlDocument::new();
        for role in roles {
            let mut item = KdlNode::new("-");
            item.entries_mut().push(KdlEntry::new(role.clone()));
            children.nodes_mut().push(item);
        }
        node.set_children(children);

        doc.nodes_mut().push(node);
    }

    doc.autoformat();
    doc.to_string()
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Role names listed as `- "ROLE"` children.
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
