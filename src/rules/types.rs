use std::collections::{BTreeMap, BTreeSet};

use crate::rules::errors::RuleError;

/// Rendered layer name of the workspace-wide (wildcard) rule.
pub const DEFAULT_LAYER: &str = "default";

/// Separator of the rendered rule path; not allowed inside names.
pub const PATH_SEPARATOR: char = '/';

/// Role names are case-sensitive and kept sorted so listings are stable.
pub type RoleSet = BTreeSet<String>;

/// The full rule set, keyed by rule identity.
pub type RuleSet = BTreeMap<RuleKey, RoleSet>;

/// Access method a rule applies to: `r`, `w` or `a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Read,
    Write,
    Admin,
}

impl Method {
    /// Accepts the single-character code in either case.
    pub fn from_code(code: char) -> Result<Self, RuleError> {
        match code.to_ascii_lowercase() {
            'r' => Ok(Method::Read),
            'w' => Ok(Method::Write),
            'a' => Ok(Method::Admin),
            other => Err(RuleError::InvalidArgument(format!(
                "unknown method `{other}` (expected one of r, w, a)"
            ))),
        }
    }

    /// Parse the first character of a method string, as sent by clients
    /// that pass e.g. `write` or `W`.
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        let code = s
            .trim()
            .chars()
            .next()
            .ok_or_else(|| RuleError::InvalidArgument("method must not be empty".into()))?;
        Self::from_code(code)
    }

    pub fn code(self) -> char {
        match self {
            Method::Read => 'r',
            Method::Write => 'w',
            Method::Admin => 'a',
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Layer part of a rule key. The wildcard is its own variant so it never
/// collides with a literal layer name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerScope {
    Default,
    Named(String),
}

impl LayerScope {
    /// Absent and empty layers both mean the workspace-wide rule.
    pub fn from_param(layer: Option<&str>) -> Result<Self, RuleError> {
        match layer.map(str::trim) {
            None | Some("") => Ok(LayerScope::Default),
            Some(DEFAULT_LAYER) => Err(RuleError::InvalidArgument(format!(
                "layer name `{DEFAULT_LAYER}` is reserved for workspace-wide rules; omit the layer instead"
            ))),
            Some(name) if name.contains(PATH_SEPARATOR) => Err(RuleError::InvalidArgument(
                format!("layer name `{name}` must not contain `{PATH_SEPARATOR}`"),
            )),
            Some(name) => Ok(LayerScope::Named(name.to_string())),
        }
    }

    pub fn as_layer(&self) -> Option<&str> {
        match self {
            LayerScope::Default => None,
            LayerScope::Named(name) => Some(name),
        }
    }
}

impl std::fmt::Display for LayerScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerScope::Default => f.write_str(DEFAULT_LAYER),
            LayerScope::Named(name) => f.write_str(name),
        }
    }
}

/// Identity of a rule: "workspace/layer/method".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub workspace: String,
    pub layer: LayerScope,
    pub method: Method,
}

impl RuleKey {
    /// Build a normalized key from caller-supplied parts.
    pub fn new(workspace: &str, layer: Option<&str>, method: char) -> Result<Self, RuleError> {
        let workspace = workspace.trim();
        if workspace.is_empty() {
            return Err(RuleError::InvalidArgument(
                "workspace must not be empty".into(),
            ));
        }
        if workspace.contains(PATH_SEPARATOR) {
            return Err(RuleError::InvalidArgument(format!(
                "workspace name `{workspace}` must not contain `{PATH_SEPARATOR}`"
            )));
        }
        Ok(Self {
            workspace: workspace.to_string(),
            layer: LayerScope::from_param(layer)?,
            method: Method::from_code(method)?,
        })
    }

    /// Rendered path used in listings and error messages.
    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.workspace, self.layer, self.method)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub key: RuleKey,
    pub roles: RoleSet,
}

impl Rule {
    pub fn new(key: RuleKey, roles: RoleSet) -> Self {
        Self { key, roles }
    }
}

/// Outcome of an operation that creates a rule or appends to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Appended,
}

/// Collect caller roles into a set, dropping blank names.
pub fn role_set<I, S>(roles: I) -> RoleSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    roles
        .into_iter()
        .map(|r| r.as_ref().trim().to_string())
        .filter(|r| !r.is_empty())
        .collect()
}
