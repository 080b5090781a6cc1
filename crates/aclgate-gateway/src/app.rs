//! One installed connector app: its ACLs and its OS process.
//!
//! Every ACL mutation ends in the same tail: recompile the app's active rules,
//! re-evaluate whether the process should run, and tell the app.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use aclgate_core::error::{GatewayError, ResponseCode, Result};
use aclgate_core::ident::AppIdentifier;
use aclgate_core::manifest::{AppManifest, InterfaceDecl};
use aclgate_core::matcher::{self, CapabilityIndex};
use aclgate_core::protocol::admin::{
    AclSpec, AclSummary, AclView, AclWriteResponse, AppStatusView, AppSummary, ManifestRulesView,
};
use aclgate_core::protocol::notify::{
    AppStatus, ConnectionStatus, InstallStatus, Notification, OperationalStatus,
};
use aclgate_core::rules::{AclStatus, RemotedAppRequest, Rule, RuleSet};

use crate::acl::{generate_acl_id, Acl, AclState};
use crate::app_state::{lock, AppState};
use crate::metadata::NamesSnapshot;
use crate::process::{parse_env, LaunchSpec};

#[derive(Debug, Clone, Default)]
struct AppRuntime {
    connection: ConnectionStatus,
    operational: OperationalStatus,
    install: InstallStatus,
    install_description: String,
    /// Set exactly while `operational == Running`.
    pid: Option<u32>,
}

impl AppRuntime {
    fn status(&self) -> AppStatus {
        AppStatus {
            connection: self.connection,
            operational: self.operational,
            install: self.install,
            install_description: self.install_description.clone(),
        }
    }
}

/// Validated remote rules plus what was turned away.
#[derive(Default)]
struct RemoteValidation {
    rules: BTreeMap<AppIdentifier, Vec<Rule>>,
    rejected: Vec<RemotedAppRequest>,
    invalid_interfaces: BTreeSet<InterfaceDecl>,
}

pub struct ConnectorApp {
    id: String,
    manifest: AppManifest,
    exposed: CapabilityIndex,
    remoted: CapabilityIndex,
    acls: Mutex<BTreeMap<String, Acl>>,
    runtime: Mutex<AppRuntime>,
    /// A stop worker is in flight; further stop requests coalesce into it.
    stopping: AtomicBool,
    /// Supervisor shutdown began; never start again.
    shutting_down: AtomicBool,
}

impl ConnectorApp {
    pub fn new(id: impl Into<String>, manifest: AppManifest) -> Self {
        let exposed = CapabilityIndex::new(manifest.exposed_services.clone());
        let remoted = CapabilityIndex::new(manifest.remoted_services.clone());
        Self {
            id: id.into(),
            manifest,
            exposed,
            remoted,
            acls: Mutex::new(BTreeMap::new()),
            runtime: Mutex::new(AppRuntime::default()),
            stopping: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn manifest(&self) -> &AppManifest {
        &self.manifest
    }

    fn lock_acls(&self) -> Result<MutexGuard<'_, BTreeMap<String, Acl>>> {
        lock(&self.acls, "acls")
    }

    fn lock_runtime(&self) -> Result<MutexGuard<'_, AppRuntime>> {
        lock(&self.runtime, "app runtime")
    }

    // ---------------------------------------------------------------
    // ACL management
    // ---------------------------------------------------------------

    /// Load every stored ACL. Unreadable documents are skipped.
    pub fn load_acls(&self, state: &AppState) -> Result<usize> {
        let ids = state.store().list_acls(&self.id)?;
        let mut acls = self.lock_acls()?;
        let mut md = state.metadata()?;

        for acl_id in ids {
            match Acl::load(state.store().as_ref(), &self.id, &acl_id) {
                Ok(acl) => {
                    for remote in acl.rules().remote_apps.keys() {
                        md.increment_ref(remote);
                    }
                    acls.insert(acl_id, acl);
                }
                Err(e) => {
                    tracing::warn!(app_id = %self.id, acl_id = %acl_id, error = %e, "skipping unreadable acl");
                }
            }
        }

        tracing::info!(app_id = %self.id, acls = acls.len(), "acls loaded");
        Ok(acls.len())
    }

    pub fn has_active_acl(&self) -> Result<bool> {
        Ok(self.lock_acls()?.values().any(Acl::is_active))
    }

    /// Hand this app's active rule sets to the policy compiler.
    pub fn update_policies(&self, state: &AppState) -> Result<()> {
        let active: Vec<RuleSet> = self
            .lock_acls()?
            .values()
            .filter(|a| a.is_active())
            .map(|a| a.rules().clone())
            .collect();
        state.compiler()?.add_rules(&self.id, active)
    }

    fn validate_remote(&self, requested: &[RemotedAppRequest]) -> RemoteValidation {
        let mut out = RemoteValidation::default();

        for req in requested {
            let id = match AppIdentifier::new(&req.app_id, req.device_id.clone()) {
                Ok(id) => id,
                Err(e) => {
                    tracing::debug!(app_id = %self.id, error = %e, "remote app identity rejected");
                    out.rejected.push(req.clone());
                    continue;
                }
            };

            let v = matcher::validate(&req.rules, &self.remoted);
            out.invalid_interfaces.extend(v.invalid_interfaces);
            if !v.rejected.is_empty() {
                out.rejected.push(RemotedAppRequest {
                    app_id: req.app_id.clone(),
                    device_id: req.device_id.clone(),
                    rules: v.rejected,
                });
            }
            if !v.rules.is_empty() {
                out.rules.entry(id).or_default().extend(v.rules);
            }
        }

        out
    }

    /// Validate a requested ACL body into rules to store plus a response
    /// describing what was rejected.
    fn validate_spec(&self, spec: &AclSpec) -> (RuleSet, AclWriteResponse) {
        let exposed = matcher::validate(&spec.exposed_services, &self.exposed);
        let remote = self.validate_remote(&spec.remoted_apps);

        let mut resp = AclWriteResponse::failed(ResponseCode::Success);
        resp.rejected_exposed = exposed.rejected;
        resp.rejected_remote = remote.rejected;
        resp.invalid_interfaces = exposed.invalid_interfaces;
        resp.invalid_interfaces.extend(remote.invalid_interfaces);

        let rules = RuleSet {
            exposed_services: exposed.rules,
            remote_apps: remote.rules,
        };
        (rules, resp)
    }

    pub fn create_acl(
        self: &Arc<Self>,
        state: &AppState,
        status: AclStatus,
        spec: AclSpec,
    ) -> Result<AclWriteResponse> {
        let (rules, mut resp) = self.validate_spec(&spec);

        let mut acls = self.lock_acls()?;
        let staged = stage_names(state, &spec.metadata)?;

        let acl_id = generate_acl_id(&spec.name, |c| acls.contains_key(c));
        let acl = Acl::new(
            acl_id.clone(),
            AclState {
                name: spec.name,
                status,
                rules,
                custom_metadata: spec.custom_metadata,
            },
        );
        if let Err(e) = acl.persist(state.store().as_ref(), &self.id) {
            unstage_names(state, staged);
            return Err(e);
        }
        acls.insert(acl_id.clone(), acl);
        drop(acls);

        tracing::info!(app_id = %self.id, acl_id = %acl_id, ?status, partial = resp.is_partial(), "acl created");
        resp.acl_id = Some(acl_id);
        if status == AclStatus::Active {
            resp.code = self.rules_changed(state);
        }
        Ok(resp)
    }

    pub fn update_acl(
        self: &Arc<Self>,
        state: &AppState,
        acl_id: &str,
        spec: AclSpec,
    ) -> Result<AclWriteResponse> {
        let (rules, mut resp) = self.validate_spec(&spec);

        let mut acls = self.lock_acls()?;
        let acl = acls
            .get_mut(acl_id)
            .ok_or_else(|| GatewayError::AclNotFound(acl_id.to_string()))?;
        let staged = stage_names(state, &spec.metadata)?;

        let AclSpec {
            name,
            custom_metadata,
            ..
        } = spec;
        let written = acl.transact(state.store().as_ref(), &self.id, |s| {
            s.name = name;
            s.rules = rules;
            s.custom_metadata = custom_metadata;
        });
        if let Err(e) = written {
            unstage_names(state, staged);
            return Err(e);
        }
        let active = acl.is_active();
        drop(acls);

        tracing::info!(app_id = %self.id, acl_id, partial = resp.is_partial(), "acl updated");
        resp.acl_id = Some(acl_id.to_string());
        if active {
            resp.code = self.rules_changed(state);
        }
        Ok(resp)
    }

    /// Activate or deactivate. Setting the current status again is a no-op.
    pub fn update_acl_status(
        self: &Arc<Self>,
        state: &AppState,
        acl_id: &str,
        status: AclStatus,
    ) -> Result<ResponseCode> {
        let mut acls = self.lock_acls()?;
        let acl = acls
            .get_mut(acl_id)
            .ok_or_else(|| GatewayError::AclNotFound(acl_id.to_string()))?;
        if acl.status() == status {
            return Ok(ResponseCode::Success);
        }
        acl.transact(state.store().as_ref(), &self.id, |s| s.status = status)?;
        drop(acls);

        tracing::info!(app_id = %self.id, acl_id, ?status, "acl status changed");
        Ok(self.rules_changed(state))
    }

    pub fn update_acl_metadata(
        &self,
        state: &AppState,
        acl_id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ResponseCode> {
        let acls = self.lock_acls()?;
        if !acls.contains_key(acl_id) {
            return Err(GatewayError::AclNotFound(acl_id.to_string()));
        }
        state.metadata()?.update_names(metadata)?;
        Ok(ResponseCode::Success)
    }

    pub fn update_acl_custom_metadata(
        &self,
        state: &AppState,
        acl_id: &str,
        custom_metadata: BTreeMap<String, String>,
    ) -> Result<ResponseCode> {
        let mut acls = self.lock_acls()?;
        let acl = acls
            .get_mut(acl_id)
            .ok_or_else(|| GatewayError::AclNotFound(acl_id.to_string()))?;
        acl.transact(state.store().as_ref(), &self.id, |s| {
            s.custom_metadata = custom_metadata;
        })?;
        Ok(ResponseCode::Success)
    }

    /// Remove an ACL. Metadata reference counts are left as they are; they
    /// are rebuilt from the remaining ACLs on the next boot.
    pub fn delete_acl(self: &Arc<Self>, state: &AppState, acl_id: &str) -> Result<ResponseCode> {
        let mut acls = self.lock_acls()?;
        let acl = acls
            .get(acl_id)
            .ok_or_else(|| GatewayError::AclNotFound(acl_id.to_string()))?;
        acl.delete(state.store().as_ref(), &self.id)?;
        let was_active = acl.is_active();
        acls.remove(acl_id);
        drop(acls);

        tracing::info!(app_id = %self.id, acl_id, "acl deleted");
        if was_active {
            return Ok(self.rules_changed(state));
        }
        Ok(ResponseCode::Success)
    }

    pub fn get_acl(&self, state: &AppState, acl_id: &str) -> Result<AclView> {
        let acl = self
            .lock_acls()?
            .get(acl_id)
            .cloned()
            .ok_or_else(|| GatewayError::AclNotFound(acl_id.to_string()))?;
        let rules = acl.rules();

        let mut metadata = BTreeMap::new();
        {
            let md = state.metadata()?;
            for remote in rules.remote_apps.keys() {
                md.add_values(remote, &mut metadata);
            }
        }

        let offered_remote_apps = {
            let compiler = state.compiler()?;
            matcher::extract_remoted_apps(&self.remoted, compiler.tracker().announcements())
        };

        Ok(AclView {
            id: acl.id().to_string(),
            name: acl.name().to_string(),
            status: acl.status(),
            exposed_services: matcher::add_unconfigured(
                self.exposed.capabilities(),
                &rules.exposed_services,
            ),
            remoted_apps: rules.remote_apps_list(),
            offered_remote_apps,
            metadata,
            custom_metadata: acl.state().custom_metadata.clone(),
        })
    }

    pub fn list_acls(&self) -> Result<Vec<AclSummary>> {
        Ok(self.lock_acls()?.values().map(Acl::summary).collect())
    }

    pub fn manifest_rules(&self) -> Result<ManifestRulesView> {
        let acls = self.lock_acls()?;
        let exposed = matcher::manifest_rules(
            &self.exposed,
            acls.values().flat_map(|a| a.rules().exposed_services.iter()),
        );
        let remoted = matcher::manifest_rules(
            &self.remoted,
            acls.values().flat_map(|a| a.rules().remote_apps.values().flatten()),
        );
        Ok(ManifestRulesView {
            exposed_services: exposed,
            remoted_services: remoted,
        })
    }

    /// Common tail of every mutation that changed the active rule set.
    fn rules_changed(self: &Arc<Self>, state: &AppState) -> ResponseCode {
        let code = match self.update_policies(state) {
            Ok(()) => ResponseCode::Success,
            Err(e) => {
                tracing::error!(app_id = %self.id, error = %e, "policy update failed, acl change kept");
                e.response_code()
            }
        };
        self.reconcile(state);
        self.notify(state, Notification::AclUpdated);
        code
    }

    // ---------------------------------------------------------------
    // Process lifecycle
    // ---------------------------------------------------------------

    pub fn status(&self) -> Result<AppStatusView> {
        let rt = self.lock_runtime()?;
        Ok(AppStatusView {
            app_id: self.id.clone(),
            status: rt.status(),
            pid: rt.pid,
        })
    }

    pub fn summary(&self) -> Result<AppSummary> {
        Ok(AppSummary {
            app_id: self.id.clone(),
            friendly_name: self.manifest.friendly_name.clone(),
            version: self.manifest.version.clone(),
            operational: self.lock_runtime()?.operational,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock_runtime().ok().and_then(|rt| rt.pid)
    }

    pub fn is_running(&self) -> bool {
        self.pid().is_some()
    }

    /// Stopped with an active ACL starts; running without one stops.
    pub fn reconcile(self: &Arc<Self>, state: &AppState) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let active = match self.has_active_acl() {
            Ok(active) => active,
            Err(e) => {
                tracing::error!(app_id = %self.id, error = %e, "cannot evaluate run state");
                return;
            }
        };

        match (active, self.is_running()) {
            (true, false) => self.start(state),
            (false, true) => self.request_stop(state),
            _ => {}
        }
    }

    fn launch_spec(&self, state: &AppState) -> LaunchSpec {
        let workdir = Path::new(&state.cfg().gateway.apps_dir)
            .join(&self.id)
            .join("bin");
        LaunchSpec {
            app_id: self.id.clone(),
            user: self.id.clone(),
            program: workdir.join(&self.manifest.execution.executable),
            workdir,
            args: self.manifest.execution.args.clone(),
            env: parse_env(&self.manifest.execution.env_vars),
        }
    }

    /// Spawn the process unless one is already recorded. Failures are
    /// logged and leave the app stopped.
    pub fn start(&self, state: &AppState) {
        let mut rt = match self.lock_runtime() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(app_id = %self.id, error = %e, "start skipped");
                return;
            }
        };
        if rt.pid.is_some() {
            return;
        }

        let spec = self.launch_spec(state);
        match state.process().spawn(&spec) {
            Ok(pid) => {
                rt.pid = Some(pid);
                rt.operational = OperationalStatus::Running;
                let status = rt.status();
                drop(rt);

                state.metrics().process_events.inc(&[("event", "started")]);
                state.metrics().apps_running.inc(&[]);
                tracing::info!(app_id = %self.id, pid, "app started");
                self.notify(state, Notification::AppStatusChanged(status));
            }
            Err(e) => {
                drop(rt);
                state.metrics().process_events.inc(&[("event", "start_failed")]);
                tracing::error!(app_id = %self.id, error = %e, "app start failed");
            }
        }
    }

    /// Stop on a background worker. Coalesces with a stop already in flight.
    pub fn request_stop(self: &Arc<Self>, state: &AppState) {
        if !self.is_running() {
            return;
        }
        if self.stopping.swap(true, Ordering::SeqCst) {
            tracing::debug!(app_id = %self.id, "stop already in flight");
            return;
        }

        let app = Arc::clone(self);
        let st = state.clone();
        let spawned = state.workers().spawn("stop", async move {
            app.stop_process(&st).await;
            app.stopping.store(false, Ordering::SeqCst);
            // an ACL may have been activated while we were stopping
            if !app.is_running() {
                app.reconcile(&st);
            }
        });
        if let Err(e) = spawned {
            self.stopping.store(false, Ordering::SeqCst);
            tracing::error!(app_id = %self.id, error = %e, "stop worker not started");
        }
    }

    /// Restart on a background worker. Refused while no ACL is active.
    pub fn restart(self: &Arc<Self>, state: &AppState) -> Result<ResponseCode> {
        if !self.has_active_acl()? {
            return Ok(ResponseCode::Invalid);
        }
        if self.stopping.swap(true, Ordering::SeqCst) {
            // the in-flight stop restarts the app once it completes
            return Ok(ResponseCode::Success);
        }

        let app = Arc::clone(self);
        let st = state.clone();
        let spawned = state.workers().spawn("restart", async move {
            app.stop_process(&st).await;
            app.stopping.store(false, Ordering::SeqCst);
            app.reconcile(&st);
        });
        if let Err(e) = spawned {
            self.stopping.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(ResponseCode::Success)
    }

    /// Stop for good (supervisor shutdown).
    pub fn begin_shutdown(self: &Arc<Self>, state: &AppState) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.request_stop(state);
    }

    /// Ask the app to exit, wait out the grace window, then SIGKILL and
    /// wait out the kill window. Exits are observed through the reap path.
    async fn stop_process(&self, state: &AppState) {
        let Some(pid) = self.pid() else {
            return;
        };
        let sup = &state.cfg().supervision;

        self.notify(state, Notification::ShutdownApp);
        if self.wait_for_exit(pid, sup.grace_timeout(), sup.poll_interval()).await {
            tracing::info!(app_id = %self.id, pid, "app exited after shutdown request");
            return;
        }

        tracing::warn!(app_id = %self.id, pid, "grace window expired, killing app");
        state.metrics().process_events.inc(&[("event", "killed")]);
        if let Err(e) = state.process().kill(pid) {
            tracing::warn!(app_id = %self.id, pid, error = %e, "kill failed, process probably already dead");
        }

        if !self.wait_for_exit(pid, sup.kill_timeout(), sup.poll_interval()).await {
            tracing::error!(app_id = %self.id, pid, "app not reaped after kill");
        }
    }

    async fn wait_for_exit(&self, pid: u32, window: Duration, poll: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            if self.pid() != Some(pid) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Reap notification. Returns true if `pid` was this app's process.
    pub fn on_process_exit(&self, state: &AppState, pid: u32) -> bool {
        let status = {
            let Ok(mut rt) = self.lock_runtime() else {
                return false;
            };
            if rt.pid != Some(pid) {
                return false;
            }
            rt.pid = None;
            rt.operational = OperationalStatus::Stopped;
            rt.connection = ConnectionStatus::NotInitialized;
            rt.status()
        };

        state.metrics().process_events.inc(&[("event", "exited")]);
        state.metrics().apps_running.dec(&[]);
        tracing::info!(app_id = %self.id, pid, "app stopped");
        self.notify(state, Notification::AppStatusChanged(status));
        true
    }

    pub fn set_connection_status(&self, state: &AppState, connection: ConnectionStatus) -> Result<()> {
        let status = {
            let mut rt = self.lock_runtime()?;
            if rt.connection == connection {
                return Ok(());
            }
            rt.connection = connection;
            rt.status()
        };
        self.notify(state, Notification::AppStatusChanged(status));
        Ok(())
    }

    fn notify(&self, state: &AppState, notification: Notification) {
        if let Err(e) = state.transport().notify(&self.id, &notification) {
            tracing::warn!(app_id = %self.id, signal = notification.name(), error = %e, "notification not delivered");
        }
    }
}

/// Apply the request's names ahead of the ACL write. Returns the cache as it
/// was when something changed, so a failed write can undo it.
fn stage_names(state: &AppState, names: &BTreeMap<String, String>) -> Result<Option<NamesSnapshot>> {
    if names.is_empty() {
        return Ok(None);
    }
    let mut metadata = state.metadata()?;
    let before = metadata.snapshot();
    Ok(metadata.update_names(names)?.then_some(before))
}

fn unstage_names(state: &AppState, staged: Option<NamesSnapshot>) {
    let Some(before) = staged else {
        return;
    };
    match state.metadata() {
        Ok(mut metadata) => metadata.restore(before),
        Err(e) => tracing::error!(error = %e, "metadata left ahead of a failed acl write"),
    }
}
