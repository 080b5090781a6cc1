//! Access rules as stored in an ACL and as requested by an administrator.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ident::AppIdentifier;

/// A validated grant on one object path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub object_path: String,
    #[serde(default)]
    pub is_prefix: bool,
    /// Empty means the whole path.
    #[serde(default)]
    pub interfaces: BTreeSet<String>,
    /// False for manifest entries offered for display only.
    #[serde(default = "default_configured")]
    pub configured: bool,
}

fn default_configured() -> bool {
    true
}

/// A rule as submitted by an administrator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleRequest {
    pub object_path: String,
    #[serde(default)]
    pub is_prefix: bool,
    #[serde(default)]
    pub interfaces: BTreeSet<String>,
}

/// Requested rules against one remote application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemotedAppRequest {
    pub app_id: String,
    pub device_id: String,
    #[serde(default)]
    pub rules: Vec<RuleRequest>,
}

/// Stored rules against one remote application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotedAppRules {
    #[serde(flatten)]
    pub id: AppIdentifier,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclStatus {
    #[default]
    Inactive,
    Active,
}

/// Every validated rule one ACL grants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleSet {
    pub exposed_services: Vec<Rule>,
    pub remote_apps: BTreeMap<AppIdentifier, Vec<Rule>>,
}

impl RuleSet {
    pub fn remote_apps_list(&self) -> Vec<RemotedAppRules> {
        self.remote_apps
            .iter()
            .map(|(id, rules)| RemotedAppRules {
                id: id.clone(),
                rules: rules.clone(),
            })
            .collect()
    }

    /// Merge remote rule lists, appending rules of duplicate identifiers.
    pub fn from_parts(exposed_services: Vec<Rule>, remote: Vec<RemotedAppRules>) -> Self {
        let mut remote_apps: BTreeMap<AppIdentifier, Vec<Rule>> = BTreeMap::new();
        for r in remote {
            remote_apps.entry(r.id).or_default().extend(r.rules);
        }
        Self {
            exposed_services,
            remote_apps,
        }
    }
}
