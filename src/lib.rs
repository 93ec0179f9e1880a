//! Idempotent nginx deployment for Debian-family hosts.
//!
//! A [`DeploySession`] installs `nginx-extras`, disables the distribution
//! default site, converges any number of [`SiteRequest`]s (available config,
//! enable link, optional acmetool certificate) and finally makes one service
//! call that reloads nginx only if something changed.

pub mod cli;
pub mod config;
pub mod deploy;
pub mod error;
pub mod site;
pub mod sys;

pub use config::DeployConfig;
pub use deploy::{DeploySession, NginxDeployer, SessionReport, SiteOutcome};
pub use error::{DeployError, DeployResult};
pub use site::{Manifest, SiteRequest, SiteSource, SiteSpec};
