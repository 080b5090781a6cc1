//! Shared application state for the gateway.
//!
//! Lock order is app ACLs, then metadata, then compiler. No lock is held
//! across an await.

use std::sync::{Arc, Mutex, MutexGuard};

use aclgate_core::error::{GatewayError, Result};
use aclgate_core::manifest::AppManifest;

use crate::config::GatewayConfig;
use crate::events::{EventSender, GatewayEvent};
use crate::metadata::MetadataStore;
use crate::obs::GatewayMetrics;
use crate::policy::{CompilerSettings, PolicyCompiler};
use crate::process::ProcessControl;
use crate::store::DocumentStore;
use crate::supervisor::AppSupervisor;
use crate::transport::Transport;
use crate::workers::WorkerSet;

/// The gateway's outward-facing seams.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DocumentStore>,
    pub transport: Arc<dyn Transport>,
    pub process: Arc<dyn ProcessControl>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    store: Arc<dyn DocumentStore>,
    transport: Arc<dyn Transport>,
    process: Arc<dyn ProcessControl>,
    metadata: Mutex<MetadataStore>,
    compiler: Mutex<PolicyCompiler>,
    supervisor: AppSupervisor,
    workers: WorkerSet,
    events: EventSender,
    metrics: Arc<GatewayMetrics>,
}

pub(crate) fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|_| GatewayError::Internal(format!("{what} lock poisoned")))
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: GatewayConfig, collab: Collaborators, events: EventSender) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(GatewayMetrics::default());
        let metadata = MetadataStore::load(Arc::clone(&collab.store))?;

        let settings = CompilerSettings {
            include_dir: format!("{}/apps", cfg.gateway.policy_dir.trim_end_matches('/')),
            well_known_name: cfg.gateway.well_known_name.clone(),
            object_path_root: cfg.gateway.object_path_root.clone(),
        };
        let compiler = PolicyCompiler::new(
            settings,
            Arc::clone(&collab.store),
            Arc::clone(&collab.transport),
            Arc::clone(&metrics),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                store: collab.store,
                transport: collab.transport,
                process: collab.process,
                metadata: Mutex::new(metadata),
                compiler: Mutex::new(compiler),
                supervisor: AppSupervisor::new(),
                workers: WorkerSet::new(),
                events,
                metrics,
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn process(&self) -> &Arc<dyn ProcessControl> {
        &self.inner.process
    }

    pub fn metadata(&self) -> Result<MutexGuard<'_, MetadataStore>> {
        lock(&self.inner.metadata, "metadata")
    }

    pub fn compiler(&self) -> Result<MutexGuard<'_, PolicyCompiler>> {
        lock(&self.inner.compiler, "policy compiler")
    }

    pub fn supervisor(&self) -> &AppSupervisor {
        &self.inner.supervisor
    }

    pub fn workers(&self) -> &WorkerSet {
        &self.inner.workers
    }

    pub fn events(&self) -> &EventSender {
        &self.inner.events
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.inner.metrics
    }

    /// Apply one queued event. Runs on the event worker only.
    pub fn handle_event(&self, event: GatewayEvent) {
        let kind = event.kind();
        let res = match event {
            GatewayEvent::Announcement(ann) => {
                self.compiler().and_then(|mut c| c.on_announcement(ann))
            }
            GatewayEvent::PeerLost { bus_name } => {
                self.compiler().and_then(|mut c| c.on_peer_lost(&bus_name))
            }
            GatewayEvent::ConnectionStatus { app_id, status } => self
                .supervisor()
                .app(&app_id)
                .and_then(|app| app.set_connection_status(self, status)),
            GatewayEvent::ProcessExited { pid } => {
                self.supervisor().on_process_exit(self, pid);
                Ok(())
            }
        };

        if let Err(e) = res {
            tracing::warn!(kind, error = %e, "event not applied");
        }
    }

    pub fn boot(&self, installed: Vec<(String, AppManifest)>) -> Result<()> {
        self.supervisor().boot(self, installed)
    }

    pub async fn shutdown(&self) {
        self.supervisor().shutdown(self).await
    }
}
