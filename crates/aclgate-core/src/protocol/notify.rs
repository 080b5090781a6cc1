//! App-facing notifications and status vocabulary.

use serde::{Deserialize, Serialize};

/// Bus connection state of a connector app as seen by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    NotInitialized,
    InProgress,
    Connected,
    NotConnected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalStatus {
    #[default]
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    #[default]
    Installed,
    InstallInProgress,
    UpgradeInProgress,
    UninstallInProgress,
    InstallFailed,
}

/// Point-in-time status of one connector app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub connection: ConnectionStatus,
    pub operational: OperationalStatus,
    pub install: InstallStatus,
    #[serde(default)]
    pub install_description: String,
}

/// Signals delivered to one app's bus identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Notification {
    /// The app's effective rule set changed.
    AclUpdated,
    AppStatusChanged(AppStatus),
    /// Cooperative request to exit.
    ShutdownApp,
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::AclUpdated => "acl_updated",
            Notification::AppStatusChanged(_) => "app_status_changed",
            Notification::ShutdownApp => "shutdown_app",
        }
    }
}
