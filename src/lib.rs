//! georules - access rules for workspace layers
//!
//! Manages the rules that bind a (workspace, layer, method) triple to the
//! roles allowed to use it, with create-or-append and missing-tolerant delete
//! semantics and explicit persistence to a KDL file.

pub mod errors;
pub mod rules;
pub mod settings;
