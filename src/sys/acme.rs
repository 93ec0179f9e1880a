// src/sys/acme.rs

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};
use crate::sys::command;
use crate::sys::traits::{CertificateProvisioner, ReloadHook};

/// rwxr-xr-x
const HOOK_MODE: u32 = 0o755;

// ==============================================================================
// 1. Concrete Implementation (acmetool)
// ==============================================================================

pub struct AcmetoolProvisioner {
    state_dir: PathBuf,
    hook_path: PathBuf,
    service: String,
}

impl AcmetoolProvisioner {
    pub fn new(state_dir: PathBuf, hook_path: PathBuf, service: String) -> Self {
        Self { state_dir, hook_path, service }
    }

    fn hook_script(&self, hook: &ReloadHook) -> String {
        let command = match hook {
            ReloadHook::Nginx => format!("systemctl reload {}", self.service),
            ReloadHook::Command(cmd) => cmd.clone(),
        };
        // acmetool calls every hook with the event name first.
        format!(
            "#!/bin/sh\n# Managed by nginx-deploy\n[ \"$1\" = \"live-updated\" ] || exit 42\n{}\n",
            command
        )
    }

    /// Installs the renewal hook. Returns true when the script or its mode changed.
    async fn install_hook(&self, hook: &ReloadHook) -> DeployResult<bool> {
        let script = self.hook_script(hook);
        if let Ok(existing) = fs::read_to_string(&self.hook_path).await {
            if existing == script {
                return self.ensure_hook_executable().await;
            }
        }

        if let Some(parent) = self.hook_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| DeployError::io(parent, e))?;
        }
        fs::write(&self.hook_path, script).await.map_err(|e| DeployError::io(&self.hook_path, e))?;
        fs::set_permissions(&self.hook_path, std::fs::Permissions::from_mode(HOOK_MODE))
            .await
            .map_err(|e| DeployError::io(&self.hook_path, e))?;
        info!(hook = %self.hook_path.display(), "🔐 Certificate reload hook installed");
        Ok(true)
    }

    async fn ensure_hook_executable(&self) -> DeployResult<bool> {
        let meta = fs::metadata(&self.hook_path).await.map_err(|e| DeployError::io(&self.hook_path, e))?;
        if meta.permissions().mode() & 0o7777 == HOOK_MODE {
            return Ok(false);
        }
        fs::set_permissions(&self.hook_path, std::fs::Permissions::from_mode(HOOK_MODE))
            .await
            .map_err(|e| DeployError::io(&self.hook_path, e))?;
        info!(hook = %self.hook_path.display(), "Certificate reload hook mode fixed");
        Ok(true)
    }

    async fn missing_domains(&self, domains: &[String]) -> Vec<String> {
        let mut missing = Vec::new();
        for domain in domains {
            let live = self.state_dir.join("live").join(domain);
            if fs::metadata(&live).await.is_err() {
                missing.push(domain.clone());
            }
        }
        missing
    }
}

#[async_trait]
impl CertificateProvisioner for AcmetoolProvisioner {
    async fn ensure_certificate(&self, domains: &[String], hook: &ReloadHook) -> DeployResult<bool> {
        if domains.is_empty() {
            return Err(DeployError::usage("certificate request needs at least one domain"));
        }

        let hook_changed = self.install_hook(hook).await?;

        // acmetool renews on its own schedule; only new names need a `want`.
        let missing = self.missing_domains(domains).await;
        if missing.is_empty() {
            debug!(?domains, "Certificates already present");
            return Ok(hook_changed);
        }

        info!(domains = ?missing, "🔐 Requesting certificates");
        let mut args = vec!["--batch".to_string(), "want".to_string()];
        args.extend(domains.iter().cloned());
        command::run_checked("acmetool", &args).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provisioner(dir: &std::path::Path) -> AcmetoolProvisioner {
        AcmetoolProvisioner::new(dir.join("acme"), dir.join("hooks").join("reload-nginx"), "nginx".to_string())
    }

    #[test]
    fn test_hook_script_variants() {
        let p = provisioner(std::path::Path::new("/tmp"));
        assert!(p.hook_script(&ReloadHook::Nginx).contains("systemctl reload nginx\n"));
        let custom = p.hook_script(&ReloadHook::Command("service nginx reload".into()));
        assert!(custom.starts_with("#!/bin/sh\n"));
        assert!(custom.contains("live-updated"));
        assert!(custom.ends_with("service nginx reload\n"));
    }

    #[tokio::test]
    async fn test_hook_install_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let p = provisioner(dir.path());
        let hook = ReloadHook::Command("systemctl reload nginx".into());

        assert!(p.install_hook(&hook).await.unwrap());
        assert!(!p.install_hook(&hook).await.unwrap());
        let mode = std::fs::metadata(dir.path().join("hooks/reload-nginx")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_hook_with_lost_exec_bit_is_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let p = provisioner(dir.path());
        let hook = ReloadHook::Nginx;
        let hook_file = dir.path().join("hooks/reload-nginx");

        p.install_hook(&hook).await.unwrap();
        std::fs::set_permissions(&hook_file, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(p.install_hook(&hook).await.unwrap());
        assert_eq!(std::fs::metadata(&hook_file).unwrap().permissions().mode() & 0o777, 0o755);
        assert!(!p.install_hook(&hook).await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_certificates_skip_acmetool() {
        let dir = tempfile::tempdir().unwrap();
        let p = provisioner(dir.path());
        std::fs::create_dir_all(dir.path().join("acme/live/example.com")).unwrap();

        let hook = ReloadHook::Nginx;
        p.install_hook(&hook).await.unwrap();
        let changed = p.ensure_certificate(&["example.com".to_string()], &hook).await.unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_empty_domain_list_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = provisioner(dir.path()).ensure_certificate(&[], &ReloadHook::Nginx).await.unwrap_err();
        assert!(err.is_usage());
    }
}
