#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;

use aclgate_core::error::{GatewayError, Result};
use aclgate_core::protocol::admin::{AdminRequest, AdminResponse};
use aclgate_core::protocol::notify::Notification;
use aclgate_gateway::app_state::{AppState, Collaborators};
use aclgate_gateway::config::{self, GatewayConfig};
use aclgate_gateway::dispatch::AdminDispatcher;
use aclgate_gateway::events::{self, EventSender, GatewayEvent};
use aclgate_gateway::manifest::parse_manifest;
use aclgate_gateway::process::{LaunchSpec, ProcessControl};
use aclgate_gateway::store::MemoryStore;
use aclgate_gateway::transport::Transport;

pub const LIGHT_APP: &str = "lightapp";
pub const REMOTE_HEX: &str = "00112233445566778899aabbccddeeff";
pub const REMOTE_DEVICE: &str = "dev-1";

pub const LIGHT_MANIFEST: &str = r#"
friendly_name: Light Connector
version: "1.2"
exposed_services:
  - object_path: /light
    is_prefix: true
    is_prefix_allowed: true
    interfaces:
      - name: org.x.OnOff
      - name: org.x.Color
  - object_path: /light/main
    interfaces:
      - name: org.x.OnOff
remoted_services:
  - object_path: "*"
execution:
  executable: light-connector
  args: ["--verbose"]
  env_vars: ["RUST_LOG=info"]
"#;

pub fn test_config() -> GatewayConfig {
    config::load_from_str(
        r#"
version: 1
gateway:
  apps_dir: /srv/aclgate/apps
  policy_dir: /srv/aclgate/policy
supervision:
  grace_timeout_ms: 100
  kill_timeout_ms: 100
  poll_interval_ms: 5
"#,
    )
    .expect("test config must parse")
}

/// Fake children: pids are handed out sequentially and exits are pushed
/// onto the event queue like the real reaper does.
pub struct FakeProcess {
    events: EventSender,
    next_pid: AtomicU32,
    live: Mutex<BTreeMap<String, u32>>,
    pub spawned: Mutex<Vec<LaunchSpec>>,
    pub kills: AtomicUsize,
    pub fail_spawn: AtomicBool,
}

impl FakeProcess {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_pid: AtomicU32::new(1000),
            live: Mutex::new(BTreeMap::new()),
            spawned: Mutex::new(Vec::new()),
            kills: AtomicUsize::new(0),
            fail_spawn: AtomicBool::new(false),
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// The app process exits on its own.
    pub fn exit(&self, app_id: &str) {
        let pid = self.live.lock().unwrap().remove(app_id);
        if let Some(pid) = pid {
            self.events.push(GatewayEvent::ProcessExited { pid });
        }
    }
}

impl ProcessControl for FakeProcess {
    fn spawn(&self, spec: &LaunchSpec) -> Result<u32> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(GatewayError::Process("spawn refused".into()));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().insert(spec.app_id.clone(), pid);
        self.spawned.lock().unwrap().push(spec.clone());
        Ok(pid)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        let mut live = self.live.lock().unwrap();
        let app = live.iter().find(|(_, p)| **p == pid).map(|(a, _)| a.clone());
        match app {
            Some(app) => {
                live.remove(&app);
                self.events.push(GatewayEvent::ProcessExited { pid });
                Ok(())
            }
            None => Err(GatewayError::Process(format!("no such process: {pid}"))),
        }
    }
}

/// Records every signal; optionally makes apps honor `ShutdownApp`.
pub struct RecordingTransport {
    process: Arc<FakeProcess>,
    pub notes: Mutex<Vec<(String, Notification)>>,
    pub reloads: AtomicUsize,
    pub fail_reload: AtomicBool,
    pub cooperative: AtomicBool,
}

impl RecordingTransport {
    pub fn new(process: Arc<FakeProcess>) -> Self {
        Self {
            process,
            notes: Mutex::new(Vec::new()),
            reloads: AtomicUsize::new(0),
            fail_reload: AtomicBool::new(false),
            cooperative: AtomicBool::new(true),
        }
    }

    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn count(&self, app_id: &str, name: &str) -> usize {
        self.notes
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, n)| a == app_id && n.name() == name)
            .count()
    }
}

impl Transport for RecordingTransport {
    fn reload_config(&self) -> Result<()> {
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(GatewayError::PolicyCommit("reload refused".into()));
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn notify(&self, app_id: &str, notification: &Notification) -> Result<()> {
        self.notes
            .lock()
            .unwrap()
            .push((app_id.to_string(), notification.clone()));
        if *notification == Notification::ShutdownApp && self.cooperative.load(Ordering::SeqCst) {
            self.process.exit(app_id);
        }
        Ok(())
    }
}

pub struct TestGateway {
    pub state: AppState,
    pub dispatcher: AdminDispatcher,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub process: Arc<FakeProcess>,
    worker: JoinHandle<()>,
}

impl TestGateway {
    /// Gateway over in-memory collaborators, not yet booted.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let (tx, rx) = events::channel();
        let process = Arc::new(FakeProcess::new(tx.clone()));
        let transport = Arc::new(RecordingTransport::new(Arc::clone(&process)));
        let collab = Collaborators {
            store: store.clone(),
            transport: transport.clone(),
            process: process.clone(),
        };
        let state = AppState::new(test_config(), collab, tx).expect("state");
        let worker = events::spawn_worker(rx, state.clone());
        Self {
            dispatcher: AdminDispatcher::new(state.clone()),
            state,
            store,
            transport,
            process,
            worker,
        }
    }

    /// Booted gateway with the light app installed and no ACLs.
    pub fn booted() -> Self {
        let gw = Self::new(Arc::new(MemoryStore::new()));
        gw.boot_with(&[(LIGHT_APP, LIGHT_MANIFEST)]);
        gw
    }

    pub fn boot_with(&self, apps: &[(&str, &str)]) {
        let installed = apps
            .iter()
            .map(|(id, m)| (id.to_string(), parse_manifest(m).expect("manifest")))
            .collect();
        self.state.boot(installed).expect("boot");
    }

    /// Send a request given as JSON, the way the admin socket would.
    pub fn call(&self, req: Value) -> AdminResponse {
        let req: AdminRequest = serde_json::from_value(req).expect("request json");
        self.dispatcher.handle(req)
    }

    /// Wait for stop/restart workers and every queued event.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                self.state.workers().join_all().await;
                self.state.events().wait_idle().await;
                if self.state.workers().outstanding() == 0 && self.state.events().pending() == 0 {
                    break;
                }
            }
        })
        .await
        .expect("gateway did not settle");
    }

    pub fn running(&self, app_id: &str) -> bool {
        self.state.supervisor().app(app_id).expect("app").is_running()
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

pub fn acl_id(resp: &AdminResponse) -> String {
    match resp {
        AdminResponse::AclWrite(w) => w.acl_id.clone().expect("acl id"),
        other => panic!("expected acl write, got {other:?}"),
    }
}
