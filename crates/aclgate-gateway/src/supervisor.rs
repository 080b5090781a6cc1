//! Registry of installed connector apps plus boot and shutdown ordering.

use std::sync::Arc;

use dashmap::DashMap;

use aclgate_core::error::{GatewayError, Result};
use aclgate_core::manifest::AppManifest;

use crate::app::ConnectorApp;
use crate::app_state::AppState;

#[derive(Default)]
pub struct AppSupervisor {
    apps: DashMap<String, Arc<ConnectorApp>>,
}

impl AppSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, app: ConnectorApp) -> Arc<ConnectorApp> {
        let app = Arc::new(app);
        self.apps.insert(app.id().to_string(), Arc::clone(&app));
        app
    }

    pub fn app(&self, app_id: &str) -> Result<Arc<ConnectorApp>> {
        self.apps
            .get(app_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| GatewayError::AppNotFound(app_id.to_string()))
    }

    /// Every registered app, ordered by id.
    pub fn apps(&self) -> Vec<Arc<ConnectorApp>> {
        let mut apps: Vec<_> = self.apps.iter().map(|e| Arc::clone(e.value())).collect();
        apps.sort_by(|a, b| a.id().cmp(b.id()));
        apps
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Route a reaped pid to the app that owned it.
    pub fn on_process_exit(&self, state: &AppState, pid: u32) {
        let owned = self.apps().iter().any(|app| app.on_process_exit(state, pid));
        if !owned {
            tracing::debug!(pid, "exit of unknown pid ignored");
        }
    }

    /// Load every app, publish the whole policy in one commit, then start
    /// the apps that have an active ACL.
    pub fn boot(&self, state: &AppState, installed: Vec<(String, AppManifest)>) -> Result<()> {
        state.compiler()?.set_auto_commit(false);

        let mut apps = Vec::with_capacity(installed.len());
        for (app_id, manifest) in installed {
            let app = self.register(ConnectorApp::new(app_id, manifest));
            app.load_acls(state)?;
            apps.push(app);
        }
        for app in &apps {
            app.update_policies(state)?;
        }

        {
            let mut compiler = state.compiler()?;
            compiler.set_auto_commit(true);
            // the next successful commit publishes the whole policy again
            if let Err(e) = compiler.commit() {
                tracing::error!(error = %e, "initial policy commit failed; continuing boot");
            }
        }

        for app in &apps {
            if app.has_active_acl()? {
                app.start(state);
            }
        }

        let removed = state.metadata()?.cleanup()?;
        tracing::info!(apps = apps.len(), metadata_removed = removed, "gateway booted");
        Ok(())
    }

    /// Stop every app, wait for the stop workers, then withdraw all rules.
    pub async fn shutdown(&self, state: &AppState) {
        if let Ok(mut compiler) = state.compiler() {
            compiler.set_auto_commit(false);
        }

        let apps = self.apps();
        for app in &apps {
            app.begin_shutdown(state);
        }
        state.workers().join_all().await;

        let res = state.compiler().and_then(|mut compiler| {
            for app in &apps {
                compiler.remove_rules(app.id())?;
            }
            compiler.commit()
        });
        match res {
            Ok(()) => tracing::info!(apps = apps.len(), "gateway shut down"),
            Err(e) => tracing::error!(error = %e, "policy withdrawal on shutdown failed"),
        }
    }
}
