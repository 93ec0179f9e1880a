// src/sys/systemd.rs

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};
use crate::sys::command;
use crate::sys::traits::{ServiceActions, ServiceController, ServiceState};

/// What `reconcile` has to do to move a unit from its queried state to the desired one.
pub fn plan(is_enabled: bool, is_active: bool, desired: ServiceState) -> ServiceActions {
    let started = desired.running && !is_active;
    ServiceActions {
        enabled: desired.enabled && !is_enabled,
        disabled: !desired.enabled && is_enabled,
        started,
        stopped: !desired.running && is_active,
        // A fresh start already reads the new configuration.
        reloaded: desired.running && desired.reloaded && !started,
    }
}

pub struct SystemdController {
    /// Command run before every reload; a failing test aborts the reload.
    config_test: Option<Vec<String>>,
}

impl SystemdController {
    pub fn new() -> Self {
        Self { config_test: None }
    }

    /// Runs `nginx -t` before reloading, the way a hand-edited site should be checked.
    pub fn with_nginx_config_test() -> Self {
        Self { config_test: Some(vec!["nginx".to_string(), "-t".to_string()]) }
    }

    async fn query(verb: &str, unit: &str) -> DeployResult<bool> {
        let output = command::run("systemctl", [verb, "--quiet", unit]).await?;
        Ok(output.status.success())
    }

    async fn systemctl(verb: &str, unit: &str) -> DeployResult<()> {
        command::run_checked("systemctl", [verb, unit]).await?;
        info!(unit, action = verb, "⚙️ Service action issued");
        Ok(())
    }

    async fn test_config(&self) -> DeployResult<()> {
        let Some((program, args)) = self.config_test.as_ref().and_then(|c| c.split_first()) else {
            return Ok(());
        };
        let output = command::run(program, args).await?;
        if !output.status.success() {
            return Err(DeployError::ConfigTest(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(())
    }
}

impl Default for SystemdController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceController for SystemdController {
    async fn reconcile(&self, unit: &str, desired: ServiceState) -> DeployResult<ServiceActions> {
        let is_enabled = Self::query("is-enabled", unit).await?;
        let is_active = Self::query("is-active", unit).await?;
        let actions = plan(is_enabled, is_active, desired);

        if !actions.any() {
            debug!(unit, ?desired, "Service already in desired state");
            return Ok(actions);
        }

        if actions.enabled {
            Self::systemctl("enable", unit).await?;
        }
        if actions.disabled {
            Self::systemctl("disable", unit).await?;
        }
        if actions.started {
            Self::systemctl("start", unit).await?;
        }
        if actions.stopped {
            Self::systemctl("stop", unit).await?;
        }
        if actions.reloaded {
            self.test_config().await?;
            Self::systemctl("reload", unit).await?;
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING: ServiceState = ServiceState { running: true, enabled: true, reloaded: false };
    const RELOADED: ServiceState = ServiceState { running: true, enabled: true, reloaded: true };

    #[test]
    fn test_fresh_install_is_enabled_and_started_without_reload() {
        let actions = plan(false, false, RELOADED);
        assert!(actions.enabled && actions.started);
        assert!(!actions.reloaded);
    }

    #[test]
    fn test_running_service_reloads_when_dirty() {
        let actions = plan(true, true, RELOADED);
        assert_eq!(actions, ServiceActions { reloaded: true, ..Default::default() });
    }

    #[test]
    fn test_running_service_untouched_when_clean() {
        assert!(!plan(true, true, RUNNING).any());
    }

    #[test]
    fn test_enabled_but_stopped_unit_is_started_not_reloaded() {
        let actions = plan(true, false, RELOADED);
        assert_eq!(actions, ServiceActions { started: true, ..Default::default() });
    }

    #[test]
    fn test_stop_and_disable() {
        let desired = ServiceState { running: false, enabled: false, reloaded: true };
        let actions = plan(true, true, desired);
        assert!(actions.stopped && actions.disabled);
        assert!(!actions.reloaded);
    }

    #[tokio::test]
    async fn test_config_test_failure_blocks_reload() {
        let controller = SystemdController {
            config_test: Some(vec!["sh".to_string(), "-c".to_string(), "echo 'bad directive' >&2; exit 1".to_string()]),
        };
        let err = controller.test_config().await.unwrap_err();
        assert!(matches!(err, DeployError::ConfigTest(msg) if msg == "bad directive"));
    }

    #[tokio::test]
    async fn test_no_config_test_passes() {
        assert!(SystemdController::new().test_config().await.is_ok());
    }
}
