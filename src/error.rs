// src/error.rs

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type for a deployment session.
///
/// Nothing here is retried or rolled back: a failed step aborts the session
/// and leaves the host in whatever state the last successful step produced.
/// Re-running the session converges.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The host does not use the Debian package family.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The caller asked for something invalid (e.g. zero or several config sources).
    #[error("usage error: {0}")]
    Usage(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    CommandFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// Something other than a symlink sits where a link is managed.
    #[error("refusing to replace non-symlink at {}", .0.display())]
    NotALink(PathBuf),

    #[error("unknown user or group '{0}'")]
    UnknownOwner(String),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// `nginx -t` rejected the configuration, so no reload was issued.
    #[error("nginx configuration test failed: {0}")]
    ConfigTest(String),
}

impl DeployError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DeployError::Io { path: path.into(), source }
    }

    pub(crate) fn usage<S: Into<String>>(message: S) -> Self {
        DeployError::Usage(message.into())
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, DeployError::Usage(_))
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
