//! Request parameters for the rules endpoint.
//!
//! Parameters arrive as strings (`append=true`, `role=A,B`). They are parsed
//! here into typed requests, and nothing past this module sees the raw form.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rules::errors::RuleError;
use crate::rules::manager::RuleManager;
use crate::rules::types::{role_set, LayerScope, Method, RoleSet, Upsert};

/// Body returned for successful mutations.
pub const OK: &str = "ok";

/// Raw POST parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostParams {
    pub workspace: Option<String>,
    pub method: Option<String>,
    pub role: Option<String>,
    pub append: Option<String>,
    pub layer: Option<String>,
}

/// Raw DELETE parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteParams {
    pub workspace: Option<String>,
    pub method: Option<String>,
    pub role: Option<String>,
    pub missing: Option<String>,
    pub layer: Option<String>,
}

impl PostParams {
    /// Decode an URL query string such as `workspace=geo&method=w&role=ADMIN`.
    pub fn from_query(query: &str) -> Result<Self, RuleError> {
        decode_query(query)
    }
}

impl DeleteParams {
    pub fn from_query(query: &str) -> Result<Self, RuleError> {
        decode_query(query)
    }
}

/// Typed create-or-append request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRule {
    pub workspace: String,
    pub layer: Option<String>,
    pub method: Method,
    pub roles: RoleSet,
    pub append: bool,
}

/// Typed removal request. Without a role list the whole rule is deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRule {
    pub workspace: String,
    pub layer: Option<String>,
    pub method: Method,
    /// Never `Some` of an empty set.
    pub roles: Option<RoleSet>,
    pub missing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesRequest {
    List,
    Post(PostRule),
    Delete(DeleteRule),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RulesResponse {
    Rules(BTreeMap<String, Vec<String>>),
    Message(String),
}

impl TryFrom<PostParams> for PostRule {
    type Error = RuleError;

    fn try_from(p: PostParams) -> Result<Self, Self::Error> {
        let workspace = required("workspace", p.workspace)?;
        let method = Method::parse(&required("method", p.method)?)?;
        let roles = parse_roles(&required("role", p.role)?);
        let layer = parse_layer(p.layer)?;
        Ok(Self {
            workspace,
            layer,
            method,
            roles,
            append: parse_flag(p.append.as_deref()),
        })
    }
}

impl TryFrom<DeleteParams> for DeleteRule {
    type Error = RuleError;

    fn try_from(p: DeleteParams) -> Result<Self, Self::Error> {
        let workspace = required("workspace", p.workspace)?;
        let method = Method::parse(&required("method", p.method)?)?;
        // An empty `role=` counts as absent; anything else must name a role.
        let roles = match p.role.as_deref() {
            None | Some("") => None,
            Some(raw) => {
                let roles = parse_roles(raw);
                if roles.is_empty() {
                    return Err(RuleError::InvalidArgument(format!(
                        "role list `{raw}` names no roles"
                    )));
                }
                Some(roles)
            }
        };
        let layer = parse_layer(p.layer)?;
        Ok(Self {
            workspace,
            layer,
            method,
            roles,
            missing: parse_flag(p.missing.as_deref()),
        })
    }
}

/// Apply a request to the manager. Mutations are saved before returning.
pub fn handle(manager: &RuleManager, request: RulesRequest) -> Result<RulesResponse, RuleError> {
    match request {
        RulesRequest::List => Ok(RulesResponse::Rules(manager.get_rules())),
        RulesRequest::Post(req) => {
            let roles: Vec<&str> = req.roles.iter().map(String::as_str).collect();
            let layer = req.layer.as_deref();
            let outcome = if req.append {
                manager.add_to_rule(&req.workspace, layer, req.method.code(), &roles)?
            } else {
                manager.create_or_append(&req.workspace, layer, req.method.code(), &roles)?
            };
            if outcome == Upsert::Appended && !req.append {
                tracing::debug!(workspace = %req.workspace, "Rule existed, roles appended");
            }
            manager.save()?;
            Ok(RulesResponse::Message(OK.to_string()))
        }
        RulesRequest::Delete(req) => {
            let layer = req.layer.as_deref();
            let result = match &req.roles {
                None => manager.delete_rule(&req.workspace, layer, req.method.code()),
                Some(roles) => {
                    let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
                    manager
                        .del_to_rule(&req.workspace, layer, req.method.code(), &roles, true)
                        .map(|_| ())
                }
            };

            let body = match result {
                Ok(()) => OK.to_string(),
                Err(e @ RuleError::RuleNotExists { .. }) if req.missing => {
                    tracing::warn!("{e}, ignored as requested");
                    e.to_string()
                }
                Err(e) => return Err(e),
            };
            manager.save()?;
            Ok(RulesResponse::Message(body))
        }
    }
}

fn decode_query<T: serde::de::DeserializeOwned>(query: &str) -> Result<T, RuleError> {
    serde_urlencoded::from_str(query.trim_start_matches('?'))
        .map_err(|e| RuleError::InvalidArgument(format!("invalid query string: {e}")))
}

fn required(name: &str, value: Option<String>) -> Result<String, RuleError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RuleError::InvalidArgument(format!(
            "missing required parameter `{name}`"
        ))),
    }
}

fn parse_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_roles(value: &str) -> RoleSet {
    role_set(value.split(','))
}

/// Validates early so a reserved layer name is reported before any lookup.
fn parse_layer(layer: Option<String>) -> Result<Option<String>, RuleError> {
    Ok(LayerScope::from_param(layer.as_deref())?
        .as_layer()
        .map(str::to_string))
}
