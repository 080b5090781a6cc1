use std::time::Duration;

use serde::Deserialize;
use aclgate_core::error::{GatewayError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub supervision: SupervisionSection,

    #[serde(default)]
    pub policy: PolicySection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(GatewayError::BadRequest(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.supervision.validate()?;
        self.policy.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    /// One directory per installed app: `<apps_dir>/<app_id>/{manifest.yaml,bin,acls}`.
    #[serde(default = "default_apps_dir")]
    pub apps_dir: String,

    /// Where compiled bus policy documents are written.
    #[serde(default = "default_policy_dir")]
    pub policy_dir: String,

    #[serde(default = "default_admin_socket")]
    pub admin_socket: String,

    /// Bus name apps use to reach the gateway's control channel.
    #[serde(default = "default_well_known_name")]
    pub well_known_name: String,

    /// Per-app control objects live at `<object_path_root>/<app_id>`.
    #[serde(default = "default_object_path_root")]
    pub object_path_root: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            apps_dir: default_apps_dir(),
            policy_dir: default_policy_dir(),
            admin_socket: default_admin_socket(),
            well_known_name: default_well_known_name(),
            object_path_root: default_object_path_root(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        for (field, v) in [
            ("gateway.apps_dir", &self.apps_dir),
            ("gateway.policy_dir", &self.policy_dir),
            ("gateway.admin_socket", &self.admin_socket),
            ("gateway.well_known_name", &self.well_known_name),
        ] {
            if v.trim().is_empty() {
                return Err(GatewayError::BadRequest(format!("{field} must not be empty")));
            }
        }
        if !self.object_path_root.starts_with('/') || self.object_path_root.ends_with('/') {
            return Err(GatewayError::BadRequest(
                "gateway.object_path_root must start with '/' and not end with '/'".into(),
            ));
        }
        Ok(())
    }
}

fn default_apps_dir() -> String {
    "/opt/aclgate/apps".into()
}
fn default_policy_dir() -> String {
    "/etc/aclgate/policy".into()
}
fn default_admin_socket() -> String {
    "/run/aclgate/admin.sock".into()
}
fn default_well_known_name() -> String {
    "org.aclgate.Gateway".into()
}
fn default_object_path_root() -> String {
    "/gw".into()
}

/// Process stop windows. Both are bounded polling loops.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisionSection {
    /// How long a cooperative shutdown may take before SIGKILL.
    #[serde(default = "default_grace_timeout_ms")]
    pub grace_timeout_ms: u64,

    /// How long to wait for the reap after SIGKILL.
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SupervisionSection {
    fn default() -> Self {
        Self {
            grace_timeout_ms: default_grace_timeout_ms(),
            kill_timeout_ms: default_kill_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SupervisionSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=60000).contains(&self.poll_interval_ms) {
            return Err(GatewayError::BadRequest(
                "supervision.poll_interval_ms must be between 1 and 60000".into(),
            ));
        }
        if !(1..=600000).contains(&self.grace_timeout_ms) {
            return Err(GatewayError::BadRequest(
                "supervision.grace_timeout_ms must be between 1 and 600000".into(),
            ));
        }
        if !(1..=600000).contains(&self.kill_timeout_ms) {
            return Err(GatewayError::BadRequest(
                "supervision.kill_timeout_ms must be between 1 and 600000".into(),
            ));
        }
        if self.poll_interval_ms > self.grace_timeout_ms {
            return Err(GatewayError::BadRequest(
                "supervision.poll_interval_ms must not exceed grace_timeout_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn grace_timeout(&self) -> Duration {
        Duration::from_millis(self.grace_timeout_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_grace_timeout_ms() -> u64 {
    60000
}
fn default_kill_timeout_ms() -> u64 {
    10000
}
fn default_poll_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    /// Command run after policy files are written, e.g. asking the bus daemon
    /// to reload. Empty means nothing to run.
    #[serde(default)]
    pub reload_command: Vec<String>,
}

impl PolicySection {
    pub fn validate(&self) -> Result<()> {
        if let Some(program) = self.reload_command.first() {
            if program.trim().is_empty() {
                return Err(GatewayError::BadRequest(
                    "policy.reload_command program must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}
