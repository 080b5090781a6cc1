//! Peer announcements and the remote apps derived from them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ident::AppIdentifier;
use crate::rules::Rule;

/// A live announcement as delivered by the transport's discovery layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub bus_name: String,
    /// Hex-encoded application id; may be missing on malformed announcements.
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    /// Object path -> interfaces implemented there.
    #[serde(default)]
    pub object_descriptions: BTreeMap<String, BTreeSet<String>>,
}

impl Announcement {
    /// Stable identity, or `None` when the announcement lacks or garbles it.
    pub fn identity(&self) -> Option<AppIdentifier> {
        let app_id = self.app_id.as_deref()?;
        let device_id = self.device_id.as_deref()?;
        AppIdentifier::new(app_id, device_id).ok()
    }
}

/// An announced application reachable through an app's remoted capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotedApp {
    #[serde(flatten)]
    pub id: AppIdentifier,
    pub bus_name: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    /// Offered rules, all `configured == false`.
    pub rules: Vec<Rule>,
}
