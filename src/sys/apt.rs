// src/sys/apt.rs

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};
use crate::sys::command::{self, ensure_success, is_missing_program};
use crate::sys::traits::PackageManager;

// ==============================================================================
// 1. Concrete Implementation (dpkg / apt-get)
// ==============================================================================

pub struct AptPackageManager {
    update_stamp: PathBuf,
    lists_dir: PathBuf,
}

impl AptPackageManager {
    pub fn new() -> Self {
        Self {
            update_stamp: PathBuf::from("/var/lib/apt/periodic/update-success-stamp"),
            lists_dir: PathBuf::from("/var/lib/apt/lists"),
        }
    }

    async fn is_installed(package: &str) -> DeployResult<bool> {
        let output = command::run("dpkg-query", ["-W", "-f=${Status}", package]).await?;
        // dpkg-query exits non-zero for packages it has never heard of.
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "install ok installed")
    }
}

impl Default for AptPackageManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Time of the last successful index refresh: the periodic stamp if present,
/// otherwise the lists directory itself.
async fn last_refresh(stamp: &Path, lists_dir: &Path) -> Option<DateTime<Utc>> {
    for candidate in [stamp, lists_dir] {
        if let Ok(meta) = fs::metadata(candidate).await {
            if let Ok(modified) = meta.modified() {
                return Some(modified.into());
            }
        }
    }
    None
}

fn is_stale(last: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age_hours: i64) -> bool {
    match (last, TimeDelta::try_hours(max_age_hours)) {
        (None, _) => true,
        (Some(at), Some(max_age)) => now - at > max_age,
        // An interval beyond chrono's range never elapses.
        (Some(_), None) => false,
    }
}

#[async_trait]
impl PackageManager for AptPackageManager {
    async fn is_supported(&self) -> DeployResult<bool> {
        match command::run("dpkg-query", ["--version"]).await {
            Ok(output) => Ok(output.status.success()),
            Err(e) if is_missing_program(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn update_index(&self, max_age_hours: i64) -> DeployResult<bool> {
        let last = last_refresh(&self.update_stamp, &self.lists_dir).await;
        if !is_stale(last, Utc::now(), max_age_hours) {
            debug!(last_refresh = ?last, "Package index is fresh");
            return Ok(false);
        }

        info!(last_refresh = ?last, "📦 Refreshing package index");
        command::run_checked("apt-get", ["update"]).await?;

        // Touch the stamp so the next session within the interval skips the refresh.
        if let Some(parent) = self.update_stamp.parent() {
            fs::create_dir_all(parent).await.map_err(|e| DeployError::io(parent, e))?;
        }
        fs::write(&self.update_stamp, b"").await.map_err(|e| DeployError::io(&self.update_stamp, e))?;
        Ok(true)
    }

    async fn ensure_installed(&self, packages: &[&str]) -> DeployResult<bool> {
        let mut missing = Vec::new();
        for package in packages {
            if !Self::is_installed(package).await? {
                missing.push(*package);
            }
        }
        if missing.is_empty() {
            debug!(?packages, "Packages already installed");
            return Ok(false);
        }

        info!(packages = ?missing, "📦 Installing packages");
        let mut args = vec!["install", "-y", "--no-install-recommends"];
        args.extend(missing.iter().copied());
        let output = command::run_with_env("apt-get", &args, &[("DEBIAN_FRONTEND", "noninteractive")]).await?;
        ensure_success("apt-get", output)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_refresh_is_stale() {
        assert!(is_stale(None, Utc::now(), 24));
    }

    #[test]
    fn test_staleness_respects_interval() {
        let now = Utc::now();
        assert!(!is_stale(Some(now - TimeDelta::hours(23)), now, 24));
        assert!(is_stale(Some(now - TimeDelta::hours(25)), now, 24));
        assert!(is_stale(Some(now - TimeDelta::minutes(1)), now, 0));
    }

    #[test]
    fn test_out_of_range_interval_does_not_panic() {
        let now = Utc::now();
        assert!(!is_stale(Some(now), now, i64::MAX));
        assert!(is_stale(None, now, i64::MAX));
    }

    #[tokio::test]
    async fn test_last_refresh_prefers_stamp_then_lists() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join("update-success-stamp");
        let lists = dir.path().join("lists");

        assert!(last_refresh(&stamp, &lists).await.is_none());

        std::fs::create_dir(&lists).unwrap();
        assert!(last_refresh(&stamp, &lists).await.is_some());

        std::fs::write(&stamp, b"").unwrap();
        let at = last_refresh(&stamp, &lists).await.unwrap();
        assert!(!is_stale(Some(at), Utc::now(), 24));
    }
}
