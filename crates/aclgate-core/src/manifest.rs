//! Connector app manifest: declared capabilities plus launch information.
//!
//! A manifest is parsed once when the app is discovered and is immutable
//! afterwards. Parsing from disk lives in the gateway crate; this module only
//! defines the shape.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Object path that matches every object.
pub const WILDCARD_PATH: &str = "*";

/// One bus interface a capability exposes. Identity is the interface name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceDecl {
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub secured: bool,
}

impl InterfaceDecl {
    /// Declaration known only by name (e.g. a rejected requested interface).
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: String::new(),
            secured: false,
        }
    }
}

impl PartialEq for InterfaceDecl {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for InterfaceDecl {}

impl PartialOrd for InterfaceDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InterfaceDecl {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// A declared object path and the interfaces reachable under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capability {
    pub object_path: String,
    #[serde(default)]
    pub friendly_name: String,
    /// The declaration covers every object below `object_path`.
    #[serde(default)]
    pub is_prefix: bool,
    /// ACLs may request prefix rules against this capability.
    #[serde(default)]
    pub is_prefix_allowed: bool,
    /// Empty means every interface.
    #[serde(default)]
    pub interfaces: BTreeSet<InterfaceDecl>,
}

impl Capability {
    /// A capability with no declared interfaces grants the whole path.
    pub fn is_bare_wildcard(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn supports_interface(&self, name: &str) -> bool {
        self.is_bare_wildcard() || self.interfaces.iter().any(|i| i.name == name)
    }

    /// Whether this declaration covers `path` at all.
    pub fn covers(&self, path: &str) -> bool {
        self.object_path == WILDCARD_PATH
            || self.object_path == path
            || (self.is_prefix && path_has_prefix(path, &self.object_path))
    }
}

/// `prefix` names `path` itself or an ancestor of it; `/light` does not cover `/lightbulb`.
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// How the gateway launches the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionInfo {
    /// File name inside the app's `bin` directory.
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// `KEY=VALUE` entries forming the whole environment of the child.
    #[serde(default)]
    pub env_vars: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppManifest {
    pub friendly_name: String,
    #[serde(default)]
    pub version: String,
    /// What the app offers on the bus.
    #[serde(default)]
    pub exposed_services: Vec<Capability>,
    /// What the app wants to reach on remote devices.
    #[serde(default)]
    pub remoted_services: Vec<Capability>,
    pub execution: ExecutionInfo,
}
