// src/site.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::DEFAULT_SITE;
use crate::error::{DeployError, DeployResult};

// ==============================================================================
// 1. Typed Site Model
// ==============================================================================

/// Where a site's configuration comes from. Exactly one per site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteSource {
    /// Local file copied verbatim.
    File(PathBuf),
    /// Static files served from this directory on the host.
    Webroot(PathBuf),
    /// Reverse proxy to `127.0.0.1:<port>`.
    Proxy { port: u16, websocket: bool },
    /// Permanent redirect to this URL.
    Redirect(String),
}

impl SiteSource {
    pub fn kind(&self) -> &'static str {
        match self {
            SiteSource::File(_) => "path",
            SiteSource::Webroot(_) => "webroot",
            SiteSource::Proxy { .. } => "proxy_port",
            SiteSource::Redirect(_) => "redirect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRequest {
    pub domain: String,
    pub source: SiteSource,
    pub enabled: bool,
    pub acmetool: bool,
}

impl SiteRequest {
    pub fn new(domain: impl Into<String>, source: SiteSource) -> Self {
        Self { domain: domain.into(), source, enabled: true, acmetool: false }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn acmetool(mut self, acmetool: bool) -> Self {
        self.acmetool = acmetool;
        self
    }

    /// Rejects values that would corrupt the generated nginx config or escape
    /// the sites directories.
    pub fn validate(&self) -> DeployResult<()> {
        validate_domain_format(&self.domain)?;
        match &self.source {
            SiteSource::File(path) => {
                if path.as_os_str().is_empty() {
                    return Err(DeployError::usage("site file path cannot be empty"));
                }
            }
            SiteSource::Webroot(webroot) => {
                if !webroot.is_absolute() {
                    return Err(DeployError::usage(format!(
                        "webroot must be an absolute path, got '{}'",
                        webroot.display()
                    )));
                }
                if has_unsafe_chars(&webroot.to_string_lossy()) {
                    return Err(DeployError::usage(format!(
                        "webroot contains characters nginx would misparse: '{}'",
                        webroot.display()
                    )));
                }
            }
            SiteSource::Proxy { port, .. } => {
                if *port == 0 {
                    return Err(DeployError::usage("proxy port 0 is reserved"));
                }
            }
            SiteSource::Redirect(target) => {
                if target.is_empty() || has_unsafe_chars(target) || target.contains('"') {
                    return Err(DeployError::usage(format!("invalid redirect target: '{}'", target)));
                }
            }
        }
        Ok(())
    }
}

fn has_unsafe_chars(value: &str) -> bool {
    value.chars().any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '{' | '}'))
}

/// 🛡️ Strictly validates domain names to prevent config injection and path traversal.
pub fn validate_domain_format(domain: &str) -> DeployResult<()> {
    if domain.is_empty() {
        return Err(DeployError::usage("domain cannot be empty"));
    }
    if domain.contains("..") || domain.contains('/') || domain.contains('\\') || domain.starts_with('.') {
        return Err(DeployError::usage(format!("path traversal detected in domain: '{}'", domain)));
    }
    if domain == DEFAULT_SITE {
        return Err(DeployError::usage("'default' is reserved for the distribution site"));
    }
    // A wildcard is only allowed as the leftmost label.
    let rest = domain.strip_prefix("*.").unwrap_or(domain);
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_') {
        return Err(DeployError::usage(format!("invalid characters in domain name: '{}'", domain)));
    }
    Ok(())
}

// ==============================================================================
// 2. Loose Request Shape (manifest / CLI)
// ==============================================================================

fn default_enabled() -> bool {
    true
}

/// One site as written by a human: four optional sources, of which exactly one
/// must be set. Converted into a [`SiteRequest`] through `TryFrom`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteSpec {
    pub domain: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub webroot: Option<PathBuf>,
    #[serde(default)]
    pub proxy_port: Option<u16>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub acmetool: bool,
    #[serde(default)]
    pub websocket_support: bool,
}

impl TryFrom<SiteSpec> for SiteRequest {
    type Error = DeployError;

    fn try_from(spec: SiteSpec) -> DeployResult<Self> {
        let mut sources = Vec::new();
        if let Some(path) = spec.path {
            sources.push(SiteSource::File(path));
        }
        if let Some(webroot) = spec.webroot {
            sources.push(SiteSource::Webroot(webroot));
        }
        if let Some(port) = spec.proxy_port {
            sources.push(SiteSource::Proxy { port, websocket: spec.websocket_support });
        }
        if let Some(target) = spec.redirect {
            sources.push(SiteSource::Redirect(target));
        }

        let source = match sources.len() {
            0 => {
                return Err(DeployError::usage(format!(
                    "site '{}' needs one of path, webroot, proxy_port or redirect",
                    spec.domain
                )));
            }
            1 => sources.remove(0),
            _ => {
                let kinds: Vec<&str> = sources.iter().map(SiteSource::kind).collect();
                return Err(DeployError::usage(format!(
                    "site '{}' sets several config sources ({}); pick exactly one",
                    spec.domain,
                    kinds.join(", ")
                )));
            }
        };

        if spec.websocket_support && !matches!(source, SiteSource::Proxy { .. }) {
            return Err(DeployError::usage(format!(
                "site '{}': websocket_support only applies to proxy_port sites",
                spec.domain
            )));
        }

        let request = SiteRequest { domain: spec.domain, source, enabled: spec.enabled, acmetool: spec.acmetool };
        request.validate()?;
        Ok(request)
    }
}

/// A JSON deployment manifest: `{"sites": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub sites: Vec<SiteSpec>,
}

impl Manifest {
    pub fn from_json(raw: &str) -> DeployResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Validates every site up front so a bad entry aborts before anything is written.
    /// A domain may appear only once: two entries would fight over the same files.
    pub fn into_requests(self) -> DeployResult<Vec<SiteRequest>> {
        let mut seen = HashSet::new();
        let mut requests = Vec::with_capacity(self.sites.len());
        for spec in self.sites {
            let request = SiteRequest::try_from(spec)?;
            if !seen.insert(request.domain.to_ascii_lowercase()) {
                return Err(DeployError::usage(format!(
                    "site '{}' is listed more than once",
                    request.domain
                )));
            }
            requests.push(request);
        }
        Ok(requests)
    }
}
