// src/config.rs

use chrono::TimeDelta;
use std::env;
use std::path::PathBuf;

use crate::error::{DeployError, DeployResult};

/// Name of the site the distribution package enables out of the box.
pub const DEFAULT_SITE: &str = "default";

#[derive(Clone, Debug)]
pub struct DeployConfig {
    // 📂 nginx layout: sites-available / sites-enabled live beneath this
    pub nginx_dir: PathBuf,

    // 📦 Package & service identity
    pub package: String,
    pub service: String,
    pub apt_max_age_hours: i64,

    // 🔐 acmetool
    pub acme_hooks_dir: PathBuf,
    pub acme_state_dir: PathBuf,

    /// Enforce root:root on managed files. Off only for unprivileged staging trees.
    pub manage_ownership: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            nginx_dir: PathBuf::from("/etc/nginx"),
            package: "nginx-extras".to_string(),
            service: "nginx".to_string(),
            apt_max_age_hours: 24,
            acme_hooks_dir: PathBuf::from("/usr/lib/acme/hooks"),
            acme_state_dir: PathBuf::from("/var/lib/acme"),
            manage_ownership: true,
        }
    }
}

impl DeployConfig {
    /// Loads the configuration from `NGINX_DEPLOY_*` environment variables,
    /// falling back to the Debian defaults for anything unset.
    pub fn load() -> DeployResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> DeployResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Parsed strictly: a typo in the environment must not silently fall back.
        let apt_max_age_hours = match lookup("NGINX_DEPLOY_APT_MAX_AGE_HOURS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|h| *h >= 0 && TimeDelta::try_hours(*h).is_some())
                .ok_or_else(|| {
                    DeployError::Config(format!(
                        "NGINX_DEPLOY_APT_MAX_AGE_HOURS must be a non-negative number of hours in range, got '{}'",
                        raw
                    ))
                })?,
            None => defaults.apt_max_age_hours,
        };

        let manage_ownership = match lookup("NGINX_DEPLOY_MANAGE_OWNERSHIP") {
            Some(raw) => parse_bool("NGINX_DEPLOY_MANAGE_OWNERSHIP", &raw)?,
            None => defaults.manage_ownership,
        };

        let config = Self {
            nginx_dir: lookup("NGINX_DEPLOY_NGINX_DIR").map(PathBuf::from).unwrap_or(defaults.nginx_dir),
            package: lookup("NGINX_DEPLOY_PACKAGE").unwrap_or(defaults.package),
            service: lookup("NGINX_DEPLOY_SERVICE").unwrap_or(defaults.service),
            apt_max_age_hours,
            acme_hooks_dir: lookup("NGINX_DEPLOY_ACME_HOOKS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.acme_hooks_dir),
            acme_state_dir: lookup("NGINX_DEPLOY_ACME_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.acme_state_dir),
            manage_ownership,
        };

        if !config.nginx_dir.is_absolute() {
            return Err(DeployError::Config(format!(
                "NGINX_DEPLOY_NGINX_DIR must be absolute, got '{}'",
                config.nginx_dir.display()
            )));
        }
        if config.package.trim().is_empty() || config.service.trim().is_empty() {
            return Err(DeployError::Config("package and service names cannot be empty".into()));
        }

        Ok(config)
    }

    pub fn sites_available_dir(&self) -> PathBuf {
        self.nginx_dir.join("sites-available")
    }

    pub fn sites_enabled_dir(&self) -> PathBuf {
        self.nginx_dir.join("sites-enabled")
    }

    pub fn sites_available(&self, domain: &str) -> PathBuf {
        self.sites_available_dir().join(domain)
    }

    pub fn sites_enabled(&self, domain: &str) -> PathBuf {
        self.sites_enabled_dir().join(domain)
    }

    pub fn default_site_link(&self) -> PathBuf {
        self.sites_enabled(DEFAULT_SITE)
    }

    /// Shell command handed to the certificate provisioner as its renewal hook.
    pub fn reload_command(&self) -> String {
        format!("systemctl reload {}", self.service)
    }

    /// Where acmetool keeps the current `fullchain` and `privkey` for `domain`.
    pub fn acme_live_dir(&self, domain: &str) -> PathBuf {
        self.acme_state_dir.join("live").join(domain)
    }

    pub fn acme_hook_path(&self) -> PathBuf {
        self.acme_hooks_dir.join(format!("reload-{}", self.service))
    }
}

fn parse_bool(key: &str, raw: &str) -> DeployResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DeployError::Config(format!("{} must be a boolean, got '{}'", key, raw))),
    }
}
