// src/sys/traits.rs

use async_trait::async_trait;
use std::path::Path;

use crate::error::DeployResult;

// ==============================================================================
// 1. Package Management
// ==============================================================================

#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Whether the host belongs to the package family this manager drives.
    async fn is_supported(&self) -> DeployResult<bool>;

    /// Refreshes the package index if its last refresh is older than `max_age_hours`.
    /// Returns true when a refresh actually ran.
    async fn update_index(&self, max_age_hours: i64) -> DeployResult<bool>;

    /// Ensures every package is installed. Returns true when anything was installed.
    async fn ensure_installed(&self, packages: &[&str]) -> DeployResult<bool>;
}

// ==============================================================================
// 2. File & Link Synchronization (Idempotent)
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub user: String,
    pub group: String,
}

impl Ownership {
    pub fn root() -> Self {
        Self { user: "root".to_string(), group: "root".to_string() }
    }
}

/// Every method reports whether the host actually changed.
#[async_trait]
pub trait FileSync: Send + Sync {
    /// Makes `dest` hold exactly `content` with the given owner and mode.
    async fn put_file(&self, dest: &Path, content: &[u8], owner: &Ownership, mode: u32) -> DeployResult<bool>;

    /// Makes `link` a symlink pointing at `target`, owned by `owner`.
    async fn ensure_link(&self, link: &Path, target: &Path, owner: &Ownership) -> DeployResult<bool>;

    /// Makes sure no symlink exists at `link`. The link target is never touched.
    async fn remove_link(&self, link: &Path) -> DeployResult<bool>;
}

// ==============================================================================
// 3. Template Rendering
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteTemplate {
    Webroot,
    Proxy,
    Redirect,
}

impl SiteTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            SiteTemplate::Webroot => "webroot.conf",
            SiteTemplate::Proxy => "proxy.conf",
            SiteTemplate::Redirect => "redirect.conf",
        }
    }
}

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: SiteTemplate, context: &minijinja::Value) -> DeployResult<String>;
}

// ==============================================================================
// 4. Service Control
// ==============================================================================

/// Desired state handed to the service controller once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceState {
    pub running: bool,
    pub enabled: bool,
    /// Re-read configuration without dropping connections.
    pub reloaded: bool,
}

/// The systemctl actions a reconciliation issued, or has to issue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServiceActions {
    pub enabled: bool,
    pub disabled: bool,
    pub started: bool,
    pub stopped: bool,
    pub reloaded: bool,
}

impl ServiceActions {
    pub fn any(&self) -> bool {
        *self != Self::default()
    }
}

#[async_trait]
pub trait ServiceController: Send + Sync {
    /// Moves `unit` to `desired` and reports exactly what was done to it.
    async fn reconcile(&self, unit: &str, desired: ServiceState) -> DeployResult<ServiceActions>;
}

// ==============================================================================
// 5. Certificate Provisioning
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadHook {
    /// The provisioner's own nginx reload integration.
    Nginx,
    /// Shell command run after a certificate is renewed.
    Command(String),
}

#[async_trait]
pub trait CertificateProvisioner: Send + Sync {
    /// Ensures a valid certificate exists for `domains`. Returns true on any change.
    async fn ensure_certificate(&self, domains: &[String], hook: &ReloadHook) -> DeployResult<bool>;
}
