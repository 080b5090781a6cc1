//! Turns every app's active rule sets into bus policy documents.
//!
//! Each commit regenerates the full policy from the stored rule sets and the
//! announcement tracker; nothing is patched incrementally.

use std::collections::BTreeMap;
use std::sync::Arc;

use aclgate_core::announce::Announcement;
use aclgate_core::error::{GatewayError, Result};
use aclgate_core::manifest::WILDCARD_PATH;
use aclgate_core::rules::{Rule, RuleSet};

use crate::obs::GatewayMetrics;
use crate::store::{DocKey, DocumentStore};
use crate::transport::Transport;

use super::busconfig::{CompiledPolicy, DefaultPolicy, PolicyEntry, UserPolicy};
use super::tracker::AnnouncementTracker;

const BUS_DAEMON: &str = "org.freedesktop.DBus";
const ABOUT_PATH: &str = "/About";
const ABOUT_ICON_PATH: &str = "/About/DeviceIcon";

/// Static inputs of compilation.
#[derive(Debug, Clone)]
pub struct CompilerSettings {
    /// Directory the default document includes (where per-app documents live).
    pub include_dir: String,
    pub well_known_name: String,
    pub object_path_root: String,
}

pub struct PolicyCompiler {
    settings: CompilerSettings,
    /// Active rule sets per app. Every installed app has an entry, possibly empty.
    app_rules: BTreeMap<String, Vec<RuleSet>>,
    tracker: AnnouncementTracker,
    auto_commit: bool,
    store: Arc<dyn DocumentStore>,
    transport: Arc<dyn Transport>,
    metrics: Arc<GatewayMetrics>,
}

impl PolicyCompiler {
    /// Starts in batch mode; call [`set_auto_commit`](Self::set_auto_commit) once booted.
    pub fn new(
        settings: CompilerSettings,
        store: Arc<dyn DocumentStore>,
        transport: Arc<dyn Transport>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            settings,
            app_rules: BTreeMap::new(),
            tracker: AnnouncementTracker::new(),
            auto_commit: false,
            store,
            transport,
            metrics,
        }
    }

    pub fn set_auto_commit(&mut self, on: bool) {
        self.auto_commit = on;
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn tracker(&self) -> &AnnouncementTracker {
        &self.tracker
    }

    /// Replace one app's active rule sets.
    pub fn add_rules(&mut self, app_id: &str, rule_sets: Vec<RuleSet>) -> Result<()> {
        self.app_rules.insert(app_id.to_string(), rule_sets);
        self.commit_if_auto()
    }

    /// Forget an app entirely, including its policy document.
    pub fn remove_rules(&mut self, app_id: &str) -> Result<()> {
        self.app_rules.remove(app_id);
        self.store
            .remove(&DocKey::app_policy(app_id))
            .map_err(|e| GatewayError::PolicyCommit(format!("remove policy of {app_id}: {e}")))?;
        self.commit_if_auto()
    }

    pub fn on_announcement(&mut self, ann: Announcement) -> Result<()> {
        self.metrics.announcements.inc(&[("kind", "announce")]);
        if self.tracker.announce(ann) {
            self.commit_if_auto()?;
        }
        Ok(())
    }

    pub fn on_peer_lost(&mut self, bus_name: &str) -> Result<()> {
        self.metrics.announcements.inc(&[("kind", "peer_lost")]);
        if self.tracker.peer_lost(bus_name) {
            self.commit_if_auto()?;
        }
        Ok(())
    }

    fn commit_if_auto(&self) -> Result<()> {
        if self.auto_commit {
            self.commit()
        } else {
            Ok(())
        }
    }

    /// Compile, persist every document, then ask the transport to reload.
    pub fn commit(&self) -> Result<()> {
        let compiled = self.compile();

        if let Err(e) = self.persist(&compiled) {
            self.metrics.policy_commits.inc(&[("result", "persist_failed")]);
            return Err(GatewayError::PolicyCommit(format!("persist: {e}")));
        }
        if let Err(e) = self.transport.reload_config() {
            self.metrics.policy_commits.inc(&[("result", "reload_failed")]);
            tracing::error!(error = %e, "policy written but reload failed");
            return Err(match e {
                GatewayError::PolicyCommit(_) => e,
                other => GatewayError::PolicyCommit(other.to_string()),
            });
        }

        self.metrics.policy_commits.inc(&[("result", "ok")]);
        tracing::info!(apps = compiled.apps.len(), remotes = self.tracker.len(), "policy committed");
        Ok(())
    }

    /// Write every document or none: on failure the documents already
    /// written go back to their previous bodies.
    fn persist(&self, compiled: &CompiledPolicy) -> Result<()> {
        let mut docs = vec![(DocKey::DefaultPolicy, compiled.default.render())];
        docs.extend(
            compiled
                .apps
                .iter()
                .map(|(app_id, policy)| (DocKey::app_policy(app_id), policy.render())),
        );

        let mut previous = Vec::with_capacity(docs.len());
        for (key, _) in &docs {
            previous.push(self.store.read(key)?);
        }

        for (i, (key, body)) in docs.iter().enumerate() {
            if let Err(e) = self.store.write(key, body) {
                self.restore(&docs[..i], &previous[..i]);
                return Err(e);
            }
        }
        Ok(())
    }

    fn restore(&self, written: &[(DocKey, String)], previous: &[Option<String>]) {
        for ((key, _), old) in written.iter().zip(previous) {
            let res = match old {
                Some(body) => self.store.write(key, body),
                None => self.store.remove(key),
            };
            if let Err(e) = res {
                tracing::error!(?key, error = %e, "could not restore policy document");
            }
        }
    }

    /// Pure compilation of the current state.
    pub fn compile(&self) -> CompiledPolicy {
        let default = DefaultPolicy {
            include_dir: self.settings.include_dir.clone(),
            users: self.app_rules.keys().cloned().collect(),
        };

        let apps = self
            .app_rules
            .iter()
            .map(|(app_id, sets)| {
                let mut entries = self.control_channel_entries(app_id);
                for set in sets {
                    for rule in &set.exposed_services {
                        exposed_entries(rule, &mut entries);
                    }
                    for (remote, rules) in &set.remote_apps {
                        // unreachable peers get no grant
                        let Some(bus_name) = self.tracker.bus_name(remote) else {
                            continue;
                        };
                        for rule in rules {
                            remote_entries(rule, bus_name, &mut entries);
                        }
                    }
                }
                let policy = UserPolicy {
                    user: app_id.clone(),
                    entries,
                };
                (app_id.clone(), policy)
            })
            .collect();

        CompiledPolicy { default, apps }
    }

    /// Default deny plus what every app needs regardless of its ACLs.
    fn control_channel_entries(&self, app_id: &str) -> Vec<PolicyEntry> {
        let gw = &self.settings.well_known_name;
        let control_path = format!("{}/{app_id}", self.settings.object_path_root);

        let mut out = vec![
            PolicyEntry::deny(vec![("send_type", "*".into())]),
            PolicyEntry::deny(vec![("receive_type", "*".into())]),
            PolicyEntry::allow(vec![
                ("send_destination", gw.clone()),
                ("send_path", control_path.clone()),
            ]),
            PolicyEntry::allow(vec![
                ("receive_sender", gw.clone()),
                ("receive_path", control_path),
            ]),
            PolicyEntry::allow(vec![("send_destination", BUS_DAEMON.into())]),
            PolicyEntry::allow(vec![("receive_sender", BUS_DAEMON.into())]),
        ];

        for ty in ["signal", "method_return", "error"] {
            out.push(PolicyEntry::allow(vec![
                ("send_path", ABOUT_PATH.into()),
                ("send_type", ty.into()),
            ]));
        }
        out.push(PolicyEntry::allow(vec![
            ("receive_path", ABOUT_PATH.into()),
            ("receive_type", "method_call".into()),
        ]));
        for ty in ["method_return", "error"] {
            out.push(PolicyEntry::allow(vec![
                ("send_path", ABOUT_ICON_PATH.into()),
                ("send_type", ty.into()),
            ]));
        }
        out.push(PolicyEntry::allow(vec![
            ("receive_path", ABOUT_ICON_PATH.into()),
            ("receive_type", "method_call".into()),
        ]));

        out
    }
}

/// Direction-specific attribute names.
struct Side {
    path: &'static str,
    path_prefix: &'static str,
    interface: &'static str,
    ty: &'static str,
}

const SEND: Side = Side {
    path: "send_path",
    path_prefix: "send_path_prefix",
    interface: "send_interface",
    ty: "send_type",
};

const RECEIVE: Side = Side {
    path: "receive_path",
    path_prefix: "receive_path_prefix",
    interface: "receive_interface",
    ty: "receive_type",
};

/// Allow `ty` messages on the rule's path for each interface (or the whole
/// path when the rule names none). `peer` pins the other end.
fn grant(
    side: &Side,
    ty: &str,
    rule: &Rule,
    peer: Option<(&'static str, &str)>,
    out: &mut Vec<PolicyEntry>,
) {
    let mut base = Vec::new();
    if let Some((attr, bus_name)) = peer {
        base.push((attr, bus_name.to_string()));
    }
    base.push((side.ty, ty.to_string()));
    if rule.object_path != WILDCARD_PATH {
        let attr = if rule.is_prefix { side.path_prefix } else { side.path };
        base.push((attr, rule.object_path.clone()));
    }

    if rule.interfaces.is_empty() {
        out.push(PolicyEntry::allow(base));
        return;
    }
    for iface in &rule.interfaces {
        let mut attrs = base.clone();
        attrs.push((side.interface, iface.clone()));
        out.push(PolicyEntry::allow(attrs));
    }
}

/// The app serves calls on its exposed objects and answers / signals from them.
fn exposed_entries(rule: &Rule, out: &mut Vec<PolicyEntry>) {
    grant(&RECEIVE, "method_call", rule, None, out);
    for ty in ["signal", "method_return", "error"] {
        grant(&SEND, ty, rule, None, out);
    }
}

/// The app calls into the remote peer and hears back from it.
fn remote_entries(rule: &Rule, bus_name: &str, out: &mut Vec<PolicyEntry>) {
    grant(&SEND, "method_call", rule, Some(("send_destination", bus_name)), out);
    for ty in ["signal", "method_return", "error"] {
        grant(&RECEIVE, ty, rule, Some(("receive_sender", bus_name)), out);
    }
}
