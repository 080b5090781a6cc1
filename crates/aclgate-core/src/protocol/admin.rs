//! Administrative request/response envelope (JSON).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::announce::RemotedApp;
use crate::error::ResponseCode;
use crate::manifest::InterfaceDecl;
use crate::protocol::notify::{AppStatus, OperationalStatus};
use crate::rules::{AclStatus, RemotedAppRequest, RemotedAppRules, Rule, RuleRequest};

/// Requested content of an ACL, shared by create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclSpec {
    pub name: String,
    #[serde(default)]
    pub exposed_services: Vec<RuleRequest>,
    #[serde(default)]
    pub remoted_apps: Vec<RemotedAppRequest>,
    /// Composite-keyed friendly names for remote apps and devices.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
}

/// One administrative call. `op` selects the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdminRequest {
    CreateAcl {
        app_id: String,
        #[serde(default)]
        status: AclStatus,
        #[serde(flatten)]
        acl: AclSpec,
    },
    UpdateAcl {
        app_id: String,
        acl_id: String,
        #[serde(flatten)]
        acl: AclSpec,
    },
    UpdateAclStatus {
        app_id: String,
        acl_id: String,
        status: AclStatus,
    },
    UpdateAclMetadata {
        app_id: String,
        acl_id: String,
        metadata: BTreeMap<String, String>,
    },
    UpdateAclCustomMetadata {
        app_id: String,
        acl_id: String,
        custom_metadata: BTreeMap<String, String>,
    },
    DeleteAcl {
        app_id: String,
        acl_id: String,
    },
    GetAcl {
        app_id: String,
        acl_id: String,
    },
    ListAcls {
        app_id: String,
    },
    GetAppStatus {
        app_id: String,
    },
    ListApps,
    GetManifestRules {
        app_id: String,
    },
    RestartApp {
        app_id: String,
    },
    Metrics,
}

impl AdminRequest {
    /// Operation name used in logs and metric labels.
    pub fn op(&self) -> &'static str {
        match self {
            AdminRequest::CreateAcl { .. } => "create_acl",
            AdminRequest::UpdateAcl { .. } => "update_acl",
            AdminRequest::UpdateAclStatus { .. } => "update_acl_status",
            AdminRequest::UpdateAclMetadata { .. } => "update_acl_metadata",
            AdminRequest::UpdateAclCustomMetadata { .. } => "update_acl_custom_metadata",
            AdminRequest::DeleteAcl { .. } => "delete_acl",
            AdminRequest::GetAcl { .. } => "get_acl",
            AdminRequest::ListAcls { .. } => "list_acls",
            AdminRequest::GetAppStatus { .. } => "get_app_status",
            AdminRequest::ListApps => "list_apps",
            AdminRequest::GetManifestRules { .. } => "get_manifest_rules",
            AdminRequest::RestartApp { .. } => "restart_app",
            AdminRequest::Metrics => "metrics",
        }
    }
}

/// Result of a create/update: the code plus whatever validation rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclWriteResponse {
    pub code: ResponseCode,
    #[serde(default)]
    pub acl_id: Option<String>,
    #[serde(default)]
    pub rejected_exposed: Vec<RuleRequest>,
    #[serde(default)]
    pub rejected_remote: Vec<RemotedAppRequest>,
    #[serde(default)]
    pub invalid_interfaces: BTreeSet<InterfaceDecl>,
}

impl AclWriteResponse {
    pub fn failed(code: ResponseCode) -> Self {
        Self {
            code,
            acl_id: None,
            rejected_exposed: Vec::new(),
            rejected_remote: Vec::new(),
            invalid_interfaces: BTreeSet::new(),
        }
    }

    /// Some requested sub-rules were not stored.
    pub fn is_partial(&self) -> bool {
        !self.rejected_exposed.is_empty()
            || !self.rejected_remote.is_empty()
            || !self.invalid_interfaces.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclSummary {
    pub id: String,
    pub name: String,
    pub status: AclStatus,
}

/// An ACL rendered for a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclView {
    pub id: String,
    pub name: String,
    pub status: AclStatus,
    /// Stored rules followed by untouched manifest capabilities (`configured == false`).
    pub exposed_services: Vec<Rule>,
    pub remoted_apps: Vec<RemotedAppRules>,
    /// Currently announced apps the ACL could still grant, for display.
    pub offered_remote_apps: Vec<RemotedApp>,
    pub metadata: BTreeMap<String, String>,
    pub custom_metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatusView {
    pub app_id: String,
    #[serde(flatten)]
    pub status: AppStatus,
    #[serde(default)]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSummary {
    pub app_id: String,
    pub friendly_name: String,
    pub version: String,
    pub operational: OperationalStatus,
}

/// Manifest capabilities as rules; `configured` marks ones some ACL relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRulesView {
    pub exposed_services: Vec<Rule>,
    pub remoted_services: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdminResponse {
    AclWrite(AclWriteResponse),
    Status { code: ResponseCode },
    Acl(AclView),
    Acls { acls: Vec<AclSummary> },
    AppStatus(AppStatusView),
    Apps { apps: Vec<AppSummary> },
    ManifestRules(ManifestRulesView),
    Metrics { text: String },
    Error { code: ResponseCode, message: String },
}

impl AdminResponse {
    pub fn code(&self) -> ResponseCode {
        match self {
            AdminResponse::AclWrite(w) => w.code,
            AdminResponse::Status { code } | AdminResponse::Error { code, .. } => *code,
            _ => ResponseCode::Success,
        }
    }
}
