//! One named ACL of one connector app, and its persisted form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use aclgate_core::error::{GatewayError, Result};
use aclgate_core::protocol::admin::AclSummary;
use aclgate_core::rules::{AclStatus, RemotedAppRules, Rule, RuleSet};

use crate::store::{DocKey, DocumentStore};
use crate::txn::persist_or_rollback;

/// Longest id derived from a name, before any collision suffix.
pub const MAX_ACL_ID_LEN: usize = 20;
const FALLBACK_ACL_ID: &str = "acl";

/// Everything about an ACL that a mutation can change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AclState {
    pub name: String,
    pub status: AclStatus,
    pub rules: RuleSet,
    pub custom_metadata: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AclDocument {
    name: String,
    status: AclStatus,
    #[serde(default)]
    exposed_services: Vec<Rule>,
    #[serde(default)]
    remoted_apps: Vec<RemotedAppRules>,
    #[serde(default)]
    custom_metadata: BTreeMap<String, String>,
}

impl From<&AclState> for AclDocument {
    fn from(s: &AclState) -> Self {
        AclDocument {
            name: s.name.clone(),
            status: s.status,
            exposed_services: s.rules.exposed_services.clone(),
            remoted_apps: s.rules.remote_apps_list(),
            custom_metadata: s.custom_metadata.clone(),
        }
    }
}

impl From<AclDocument> for AclState {
    fn from(d: AclDocument) -> Self {
        AclState {
            name: d.name,
            status: d.status,
            rules: RuleSet::from_parts(d.exposed_services, d.remoted_apps),
            custom_metadata: d.custom_metadata,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Acl {
    id: String,
    state: AclState,
}

impl Acl {
    pub fn new(id: String, state: AclState) -> Self {
        Self { id, state }
    }

    /// Read one stored ACL. Duplicate remote identifiers are merged.
    pub fn load(store: &dyn DocumentStore, app_id: &str, acl_id: &str) -> Result<Self> {
        let body = store
            .read(&DocKey::acl(app_id, acl_id))?
            .ok_or_else(|| GatewayError::AclNotFound(acl_id.to_string()))?;
        let doc: AclDocument = serde_json::from_str(&body).map_err(|e| {
            GatewayError::Persistence(format!("acl {app_id}/{acl_id} unreadable: {e}"))
        })?;
        Ok(Self::new(acl_id.to_string(), doc.into()))
    }

    pub fn persist(&self, store: &dyn DocumentStore, app_id: &str) -> Result<()> {
        write_state(store, app_id, &self.id, &self.state)
    }

    /// Change the ACL through `change`, persisting the result. On a
    /// persistence failure the whole previous state is restored.
    pub fn transact(
        &mut self,
        store: &dyn DocumentStore,
        app_id: &str,
        change: impl FnOnce(&mut AclState),
    ) -> Result<()> {
        let id = &self.id;
        persist_or_rollback(&mut self.state, change, |s| write_state(store, app_id, id, s))
    }

    pub fn delete(&self, store: &dyn DocumentStore, app_id: &str) -> Result<()> {
        store.remove(&DocKey::acl(app_id, &self.id))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &AclState {
        &self.state
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn status(&self) -> AclStatus {
        self.state.status
    }

    pub fn is_active(&self) -> bool {
        self.state.status == AclStatus::Active
    }

    pub fn rules(&self) -> &RuleSet {
        &self.state.rules
    }

    pub fn summary(&self) -> AclSummary {
        AclSummary {
            id: self.id.clone(),
            name: self.state.name.clone(),
            status: self.state.status,
        }
    }
}

fn write_state(store: &dyn DocumentStore, app_id: &str, acl_id: &str, state: &AclState) -> Result<()> {
    let body = serde_json::to_string_pretty(&AclDocument::from(state))
        .map_err(|e| GatewayError::Internal(format!("encode acl: {e}")))?;
    store.write(&DocKey::acl(app_id, acl_id), &body)
}

/// Derive a unique id from a display name: its alphanumeric characters (at
/// most [`MAX_ACL_ID_LEN`]), or `"acl"` if there are none, with `1`, `2`, ...
/// appended until `taken` is false.
pub fn generate_acl_id(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut base: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_ACL_ID_LEN)
        .collect();
    if base.is_empty() {
        base = FALLBACK_ACL_ID.to_string();
    }

    if !taken(&base) {
        return base;
    }
    (1u32..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use aclgate_core::ident::AppIdentifier;
    use std::collections::BTreeSet;

    #[test]
    fn id_from_name() {
        assert_eq!(generate_acl_id("Kitchen Lights!", |_| false), "KitchenLights");
        assert_eq!(generate_acl_id("-- ++", |_| false), "acl");
        assert_eq!(
            generate_acl_id("abcdefghijklmnopqrstuvwxyz", |_| false),
            "abcdefghijklmnopqrst"
        );
    }

    #[test]
    fn id_collisions_get_counter() {
        let taken: BTreeSet<&str> = ["lights", "lights1"].into();
        assert_eq!(generate_acl_id("lights", |c| taken.contains(c)), "lights2");
    }

    #[test]
    fn persisted_form_loads_back() {
        let store = MemoryStore::new();
        let remote = AppIdentifier::new("00112233445566778899aabbccddeeff", "hub").unwrap();
        let rule = Rule {
            object_path: "/light".into(),
            is_prefix: false,
            interfaces: ["org.x.OnOff".to_string()].into(),
            configured: true,
        };
        let state = AclState {
            name: "Kitchen".into(),
            status: AclStatus::Active,
            rules: RuleSet::from_parts(
                vec![rule.clone()],
                vec![RemotedAppRules { id: remote.clone(), rules: vec![rule.clone()] }],
            ),
            custom_metadata: BTreeMap::from([("room".to_string(), "kitchen".to_string())]),
        };

        Acl::new("Kitchen".into(), state.clone()).persist(&store, "lights").unwrap();
        let loaded = Acl::load(&store, "lights", "Kitchen").unwrap();
        assert_eq!(loaded.state(), &state);
        assert_eq!(loaded.rules().remote_apps[&remote], vec![rule]);
    }

    #[test]
    fn transact_rolls_back_every_field() {
        let store = MemoryStore::new();
        let mut acl = Acl::new("a".into(), AclState { name: "A".into(), ..Default::default() });
        acl.persist(&store, "lights").unwrap();

        store.set_fail_writes(true);
        let err = acl
            .transact(&store, "lights", |s| {
                s.name = "B".into();
                s.status = AclStatus::Active;
                s.custom_metadata.insert("k".into(), "v".into());
            })
            .unwrap_err();

        assert_eq!(err.response_code().as_str(), "PERSISTENCE_ERROR");
        assert_eq!(acl.name(), "A");
        assert!(!acl.is_active());
        assert!(acl.state().custom_metadata.is_empty());
    }

    #[test]
    fn missing_acl_is_not_found() {
        let store = MemoryStore::new();
        let err = Acl::load(&store, "lights", "nope").unwrap_err();
        assert_eq!(err.response_code().as_str(), "ACL_NOT_FOUND");
    }
}
