// src/sys/templates.rs

use minijinja::{Environment, UndefinedBehavior};

use crate::error::DeployResult;
use crate::sys::traits::{SiteTemplate, TemplateRenderer};

const WEBROOT_TEMPLATE: &str = include_str!("../../templates/webroot.conf.j2");
const PROXY_TEMPLATE: &str = include_str!("../../templates/proxy.conf.j2");
const REDIRECT_TEMPLATE: &str = include_str!("../../templates/redirect.conf.j2");

/// Directives spliced into the proxy template when websocket support is requested.
pub const WEBSOCKET_CONFIG: &str = "        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection \"upgrade\";
        proxy_read_timeout 86400s;";

/// The three site templates, compiled once and embedded in the binary.
pub struct NginxTemplates {
    env: Environment<'static>,
}

impl NginxTemplates {
    pub fn new() -> DeployResult<Self> {
        let mut env = Environment::new();
        // A missing variable is a bug in the caller, never an empty directive.
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_template(SiteTemplate::Webroot.name(), WEBROOT_TEMPLATE)?;
        env.add_template(SiteTemplate::Proxy.name(), PROXY_TEMPLATE)?;
        env.add_template(SiteTemplate::Redirect.name(), REDIRECT_TEMPLATE)?;
        Ok(Self { env })
    }
}

impl TemplateRenderer for NginxTemplates {
    fn render(&self, template: SiteTemplate, context: &minijinja::Value) -> DeployResult<String> {
        Ok(self.env.get_template(template.name())?.render(context)?)
    }
}
