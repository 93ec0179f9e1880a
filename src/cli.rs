// src/cli.rs

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::site::SiteSpec;

#[derive(Debug, Parser)]
#[command(name = "nginx-deploy", version, about = "Install nginx and converge its site configuration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install nginx, disable the default site and make sure the service runs.
    Bootstrap,
    /// Bootstrap, then converge every site listed in a JSON manifest.
    Apply {
        /// Path to a manifest of the form {"sites": [...]}.
        manifest: PathBuf,
    },
    /// Bootstrap, then converge a single site.
    Site(SiteArgs),
}

#[derive(Debug, Args)]
pub struct SiteArgs {
    pub domain: String,

    /// Local config file copied verbatim.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Serve static files from this directory.
    #[arg(long)]
    pub webroot: Option<PathBuf>,

    /// Reverse proxy to this local port.
    #[arg(long)]
    pub proxy_port: Option<u16>,

    /// Permanently redirect to this URL.
    #[arg(long)]
    pub redirect: Option<String>,

    /// Pass websocket upgrades through (proxy sites only).
    #[arg(long)]
    pub websocket: bool,

    /// Keep the config in sites-available but remove it from sites-enabled.
    #[arg(long)]
    pub disabled: bool,

    /// Request a certificate with acmetool.
    #[arg(long)]
    pub acmetool: bool,
}

impl From<SiteArgs> for SiteSpec {
    fn from(args: SiteArgs) -> Self {
        SiteSpec {
            domain: args.domain,
            path: args.path,
            webroot: args.webroot,
            proxy_port: args.proxy_port,
            redirect: args.redirect,
            enabled: !args.disabled,
            acmetool: args.acmetool,
            websocket_support: args.websocket,
        }
    }
}
