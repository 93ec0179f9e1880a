// src/deploy.rs

use minijinja::context;
use serde::Serialize;
use tokio::fs;
use tracing::{error, info, warn};

use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::site::{Manifest, SiteRequest, SiteSource, SiteSpec};
use crate::sys::acme::AcmetoolProvisioner;
use crate::sys::apt::AptPackageManager;
use crate::sys::files::LinuxFileSync;
use crate::sys::systemd::SystemdController;
use crate::sys::templates::{NginxTemplates, WEBSOCKET_CONFIG};
use crate::sys::traits::{
    CertificateProvisioner, FileSync, Ownership, PackageManager, ReloadHook, ServiceController, ServiceState,
    SiteTemplate, TemplateRenderer,
};

/// rw-r--r--
const SITE_MODE: u32 = 0o644;

// ==============================================================================
// 1. Session Report
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteOutcome {
    pub domain: String,
    pub certificate_changed: bool,
    pub config_changed: bool,
    pub link_changed: bool,
}

impl SiteOutcome {
    /// Whether nginx has to re-read its configuration because of this site.
    /// Certificate changes are excluded: the provisioner reloads on its own.
    pub fn needs_reload(&self) -> bool {
        self.config_changed || self.link_changed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub index_refreshed: bool,
    pub package_installed: bool,
    pub default_site_removed: bool,
    pub sites: Vec<SiteOutcome>,
    pub service_changed: bool,
    /// Something nginx reads changed during the session.
    pub reload_requested: bool,
    /// A reload was actually issued. False when the unit had to be started instead.
    pub reloaded: bool,
}

// ==============================================================================
// 2. Deployer (Dependency Injection Root)
// ==============================================================================

pub struct NginxDeployer {
    config: DeployConfig,
    packages: Box<dyn PackageManager>,
    files: Box<dyn FileSync>,
    templates: Box<dyn TemplateRenderer>,
    services: Box<dyn ServiceController>,
    certs: Box<dyn CertificateProvisioner>,
}

impl NginxDeployer {
    /// Wires the Linux implementations of every collaborator.
    pub fn new(config: DeployConfig) -> DeployResult<Self> {
        Ok(Self {
            packages: Box::new(AptPackageManager::new()),
            files: Box::new(LinuxFileSync::new(config.manage_ownership)),
            templates: Box::new(NginxTemplates::new()?),
            services: Box::new(SystemdController::with_nginx_config_test()),
            certs: Box::new(AcmetoolProvisioner::new(
                config.acme_state_dir.clone(),
                config.acme_hook_path(),
                config.service.clone(),
            )),
            config,
        })
    }

    pub fn from_parts(
        config: DeployConfig,
        packages: Box<dyn PackageManager>,
        files: Box<dyn FileSync>,
        templates: Box<dyn TemplateRenderer>,
        services: Box<dyn ServiceController>,
        certs: Box<dyn CertificateProvisioner>,
    ) -> Self {
        Self { config, packages, files, templates, services, certs }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Starts a session. Each session owns its own reload decision; run one per host.
    pub fn session(&self) -> DeploySession<'_> {
        DeploySession {
            deployer: self,
            needs_reload: false,
            default_site_checked: false,
            report: SessionReport::default(),
        }
    }

    /// Package install and service start, no sites.
    pub async fn bootstrap(&self) -> DeployResult<SessionReport> {
        self.apply(&[]).await
    }

    /// Full session: install, every site in order, then a single service reconciliation.
    pub async fn apply(&self, sites: &[SiteRequest]) -> DeployResult<SessionReport> {
        let mut session = self.session();
        session.install_nginx().await?;
        for site in sites {
            session.configure_site(site).await?;
        }
        session.finish().await
    }

    /// Like [`apply`](Self::apply) for loosely specified sites. Every spec is
    /// validated, and duplicate domains rejected, before the host is touched.
    pub async fn apply_specs(&self, specs: Vec<SiteSpec>) -> DeployResult<SessionReport> {
        let sites = match (Manifest { sites: specs }).into_requests() {
            Ok(sites) => sites,
            Err(e) => {
                error!(error = %e, "Rejected site request");
                return Err(e);
            }
        };
        self.apply(&sites).await
    }
}

// ==============================================================================
// 3. Deployment Session
// ==============================================================================

#[must_use = "a session makes no service call until it is finished"]
pub struct DeploySession<'a> {
    deployer: &'a NginxDeployer,
    needs_reload: bool,
    default_site_checked: bool,
    report: SessionReport,
}

impl DeploySession<'_> {
    pub fn needs_reload(&self) -> bool {
        self.needs_reload
    }

    fn mark_dirty(&mut self, changed: bool) {
        self.needs_reload |= changed;
    }

    /// Installs the nginx package and disables the distribution default site.
    pub async fn install_nginx(&mut self) -> DeployResult<()> {
        let d = self.deployer;

        if !d.packages.is_supported().await? {
            error!("Host has no dpkg; nginx can only be deployed on Debian-family systems");
            return Err(DeployError::UnsupportedPlatform(
                "can't deploy prerequisites on a non-deb system".to_string(),
            ));
        }

        self.report.index_refreshed = d.packages.update_index(d.config.apt_max_age_hours).await?;
        self.report.package_installed = d.packages.ensure_installed(&[d.config.package.as_str()]).await?;
        if self.report.package_installed {
            info!(package = %d.config.package, "📦 nginx installed");
        }

        self.suppress_default_site().await
    }

    /// A fresh install enables a catch-all default site that must not coexist with ours.
    pub async fn suppress_default_site(&mut self) -> DeployResult<()> {
        let link = self.deployer.config.default_site_link();
        let removed = self.deployer.files.remove_link(&link).await?;
        if removed {
            warn!(link = %link.display(), "Distribution default site disabled");
        }
        self.report.default_site_removed |= removed;
        self.mark_dirty(removed);
        self.default_site_checked = true;
        Ok(())
    }

    /// Converges one site: certificate, available config, then the enable link.
    /// Returns whether this site needs nginx to reload.
    pub async fn configure_site(&mut self, site: &SiteRequest) -> DeployResult<bool> {
        if let Err(e) = site.validate() {
            error!(domain = %site.domain, error = %e, "Rejected site request");
            return Err(e);
        }
        if !self.default_site_checked {
            self.suppress_default_site().await?;
        }

        let d = self.deployer;
        let available = d.config.sites_available(&site.domain);
        let enabled_link = d.config.sites_enabled(&site.domain);
        let root = Ownership::root();
        let mut outcome = SiteOutcome { domain: site.domain.clone(), ..Default::default() };

        // The certificate has to exist before nginx is told about the site.
        if site.acmetool {
            let hook = ReloadHook::Command(d.config.reload_command());
            outcome.certificate_changed = d.certs.ensure_certificate(&[site.domain.clone()], &hook).await?;
        }

        let content = self.render_source(site).await?;
        outcome.config_changed = d.files.put_file(&available, &content, &root, SITE_MODE).await?;

        outcome.link_changed = if site.enabled {
            d.files.ensure_link(&enabled_link, &available, &root).await?
        } else {
            d.files.remove_link(&enabled_link).await?
        };

        let dirty = outcome.needs_reload();
        info!(
            domain = %site.domain,
            source = site.source.kind(),
            enabled = site.enabled,
            config_changed = outcome.config_changed,
            link_changed = outcome.link_changed,
            "🌐 Site converged"
        );
        self.mark_dirty(dirty);
        self.report.sites.push(outcome);
        Ok(dirty)
    }

    async fn render_source(&self, site: &SiteRequest) -> DeployResult<Vec<u8>> {
        let templates = &self.deployer.templates;
        // Empty unless acmetool manages the certificate; the templates then only listen on port 80.
        let tls_dir = if site.acmetool {
            self.deployer.config.acme_live_dir(&site.domain).display().to_string()
        } else {
            String::new()
        };
        let rendered = match &site.source {
            SiteSource::File(path) => {
                return fs::read(path).await.map_err(|e| DeployError::io(path, e));
            }
            SiteSource::Webroot(webroot) => templates.render(
                SiteTemplate::Webroot,
                &context! {
                    domain => &site.domain,
                    webroot => webroot.display().to_string(),
                    tls_dir => &tls_dir,
                },
            )?,
            SiteSource::Proxy { port, websocket } => templates.render(
                SiteTemplate::Proxy,
                &context! {
                    domain => &site.domain,
                    proxy_port => port,
                    websocket_config => if *websocket { WEBSOCKET_CONFIG } else { "" },
                    tls_dir => &tls_dir,
                },
            )?,
            SiteSource::Redirect(target) => templates.render(
                SiteTemplate::Redirect,
                &context! { domain => &site.domain, redirect => target, tls_dir => &tls_dir },
            )?,
        };
        Ok(rendered.into_bytes())
    }

    /// Ensures nginx is enabled and running, reloading it if anything changed.
    /// Consumes the session: this is the one service call it makes.
    pub async fn finish(mut self) -> DeployResult<SessionReport> {
        let d = self.deployer;
        let desired = ServiceState { running: true, enabled: true, reloaded: self.needs_reload };
        let actions = d.services.reconcile(&d.config.service, desired).await?;
        self.report.service_changed = actions.any();
        self.report.reload_requested = self.needs_reload;
        self.report.reloaded = actions.reloaded;
        info!(
            unit = %d.config.service,
            reload_requested = self.needs_reload,
            started = actions.started,
            reloaded = actions.reloaded,
            sites = self.report.sites.len(),
            "✅ Deployment session finished"
        );
        Ok(self.report)
    }
}

// ==============================================================================
// 🛡️ Unit Tests — Session Semantics Against In-Memory Collaborators
// ==============================================================================
