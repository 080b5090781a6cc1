//! OS process control for connector apps.

use std::path::PathBuf;
use std::process::Stdio;

use nix::sys::signal::{kill, Signal};
use nix::unistd::{Pid, User};

use aclgate_core::error::{GatewayError, Result};

use crate::events::{EventSender, GatewayEvent};

/// Everything needed to launch one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub app_id: String,
    /// Dedicated OS account the app runs as.
    pub user: String,
    pub workdir: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// The child's entire environment.
    pub env: Vec<(String, String)>,
}

pub trait ProcessControl: Send + Sync {
    /// Launch the app and return its pid. The exit must later be reported
    /// as [`GatewayEvent::ProcessExited`].
    fn spawn(&self, spec: &LaunchSpec) -> Result<u32>;

    /// Forcefully terminate `pid`.
    fn kill(&self, pid: u32) -> Result<()>;
}

/// Spawns real child processes under the app's OS user and reaps them on the runtime.
pub struct OsProcessControl {
    events: EventSender,
}

impl OsProcessControl {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

impl ProcessControl for OsProcessControl {
    fn spawn(&self, spec: &LaunchSpec) -> Result<u32> {
        let user = User::from_name(&spec.user)
            .map_err(|e| GatewayError::Process(format!("user lookup {}: {e}", spec.user)))?
            .ok_or_else(|| GatewayError::Process(format!("no such user: {}", spec.user)))?;

        let mut child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.workdir)
            .env_clear()
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .gid(user.gid.as_raw())
            .uid(user.uid.as_raw())
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                GatewayError::Process(format!("spawn {}: {e}", spec.program.display()))
            })?;

        let pid = child
            .id()
            .ok_or_else(|| GatewayError::Process("child exited before pid was read".into()))?;

        let events = self.events.clone();
        let app_id = spec.app_id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::info!(app_id = %app_id, pid, %status, "app process exited"),
                Err(e) => tracing::warn!(app_id = %app_id, pid, error = %e, "wait on app process failed"),
            }
            events.push(GatewayEvent::ProcessExited { pid });
        });

        Ok(pid)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid)
            .map_err(|_| GatewayError::Process(format!("pid out of range: {pid}")))?;
        kill(Pid::from_raw(raw), Signal::SIGKILL)
            .map_err(|e| GatewayError::Process(format!("kill {pid}: {e}")))
    }
}

/// Split `KEY=VALUE` entries; entries without `=` are skipped.
pub fn parse_env(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|e| match e.split_once('=') {
            Some((k, v)) if !k.is_empty() => Some((k.to_string(), v.to_string())),
            _ => {
                tracing::warn!(entry = %e, "malformed env entry skipped");
                None
            }
        })
        .collect()
}
