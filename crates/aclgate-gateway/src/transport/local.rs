use std::process::Command;

use aclgate_core::error::{GatewayError, Result};
use aclgate_core::protocol::notify::Notification;

use super::Transport;

/// Runs the configured reload command and logs app signals.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    reload_command: Vec<String>,
}

impl LocalTransport {
    pub fn new(reload_command: Vec<String>) -> Self {
        Self { reload_command }
    }
}

impl Transport for LocalTransport {
    fn reload_config(&self) -> Result<()> {
        let Some((program, args)) = self.reload_command.split_first() else {
            tracing::debug!("no reload command configured");
            return Ok(());
        };

        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| GatewayError::PolicyCommit(format!("reload command {program}: {e}")))?;
        if !status.success() {
            return Err(GatewayError::PolicyCommit(format!(
                "reload command {program} exited with {status}"
            )));
        }
        tracing::debug!(program = %program, "bus policy reloaded");
        Ok(())
    }

    fn notify(&self, app_id: &str, notification: &Notification) -> Result<()> {
        match notification {
            Notification::AppStatusChanged(s) => tracing::info!(
                app_id,
                signal = notification.name(),
                operational = ?s.operational,
                connection = ?s.connection,
                "app signal"
            ),
            _ => tracing::info!(app_id, signal = notification.name(), "app signal"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reload_command_is_noop() {
        assert!(LocalTransport::default().reload_config().is_ok());
    }

    #[test]
    fn failing_reload_command_is_commit_error() {
        let t = LocalTransport::new(vec!["false".into()]);
        let err = t.reload_config().unwrap_err();
        assert_eq!(err.response_code().as_str(), "POLICY_COMMIT_ERROR");
    }
}
