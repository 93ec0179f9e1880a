// src/sys/files.rs

use async_trait::async_trait;
use nix::unistd::{Group, User};
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};
use crate::sys::traits::{FileSync, Ownership};

/// Converges files and symlinks on the local filesystem.
pub struct LinuxFileSync {
    manage_ownership: bool,
}

impl LinuxFileSync {
    pub fn new(manage_ownership: bool) -> Self {
        Self { manage_ownership }
    }

    /// Resolves user/group names, or `None` when ownership is not managed.
    fn resolve(&self, owner: &Ownership) -> DeployResult<Option<(u32, u32)>> {
        if !self.manage_ownership {
            return Ok(None);
        }
        let uid = User::from_name(&owner.user)
            .map_err(|e| DeployError::Config(format!("user lookup failed: {}", e)))?
            .ok_or_else(|| DeployError::UnknownOwner(owner.user.clone()))?
            .uid
            .as_raw();
        let gid = Group::from_name(&owner.group)
            .map_err(|e| DeployError::Config(format!("group lookup failed: {}", e)))?
            .ok_or_else(|| DeployError::UnknownOwner(owner.group.clone()))?
            .gid
            .as_raw();
        Ok(Some((uid, gid)))
    }

    async fn ensure_parent(path: &Path) -> DeployResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| DeployError::io(parent, e))?;
        }
        Ok(())
    }

    async fn read_existing(path: &Path) -> DeployResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DeployError::io(path, e)),
        }
    }
}

fn tmp_path_for(dest: &Path) -> PathBuf {
    let name = dest.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    dest.with_file_name(format!(".{}.nginx-deploy.tmp", name))
}

#[async_trait]
impl FileSync for LinuxFileSync {
    async fn put_file(&self, dest: &Path, content: &[u8], owner: &Ownership, mode: u32) -> DeployResult<bool> {
        let ids = self.resolve(owner)?;

        if Self::read_existing(dest).await?.as_deref() != Some(content) {
            Self::ensure_parent(dest).await?;

            // Write-then-rename so nginx never reads a half-written site.
            let tmp_path = tmp_path_for(dest);
            fs::write(&tmp_path, content).await.map_err(|e| DeployError::io(&tmp_path, e))?;

            let staged = async {
                fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(mode))
                    .await
                    .map_err(|e| DeployError::io(&tmp_path, e))?;
                if let Some((uid, gid)) = ids {
                    std::os::unix::fs::chown(&tmp_path, Some(uid), Some(gid))
                        .map_err(|e| DeployError::io(&tmp_path, e))?;
                }
                fs::rename(&tmp_path, dest).await.map_err(|e| DeployError::io(dest, e))
            };
            if let Err(e) = staged.await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(e);
            }

            info!(path = %dest.display(), "📝 File content updated");
            return Ok(true);
        }

        // Content already matches; converge metadata only.
        let meta = fs::metadata(dest).await.map_err(|e| DeployError::io(dest, e))?;
        let mut changed = false;

        if meta.permissions().mode() & 0o7777 != mode {
            fs::set_permissions(dest, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| DeployError::io(dest, e))?;
            info!(path = %dest.display(), mode = %format!("{:o}", mode), "File mode fixed");
            changed = true;
        }

        if let Some((uid, gid)) = ids {
            if meta.uid() != uid || meta.gid() != gid {
                std::os::unix::fs::chown(dest, Some(uid), Some(gid)).map_err(|e| DeployError::io(dest, e))?;
                info!(path = %dest.display(), "File ownership fixed");
                changed = true;
            }
        }

        if !changed {
            debug!(path = %dest.display(), "File already up to date");
        }
        Ok(changed)
    }

    async fn ensure_link(&self, link: &Path, target: &Path, owner: &Ownership) -> DeployResult<bool> {
        let ids = self.resolve(owner)?;

        let current = match fs::symlink_metadata(link).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                Some(fs::read_link(link).await.map_err(|e| DeployError::io(link, e))?)
            }
            Ok(_) => return Err(DeployError::NotALink(link.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(DeployError::io(link, e)),
        };

        let mut changed = false;
        match current {
            Some(existing) if existing == target => {}
            Some(existing) => {
                fs::remove_file(link).await.map_err(|e| DeployError::io(link, e))?;
                fs::symlink(target, link).await.map_err(|e| DeployError::io(link, e))?;
                info!(link = %link.display(), from = %existing.display(), to = %target.display(), "🔗 Link retargeted");
                changed = true;
            }
            None => {
                Self::ensure_parent(link).await?;
                fs::symlink(target, link).await.map_err(|e| DeployError::io(link, e))?;
                info!(link = %link.display(), to = %target.display(), "🔗 Link created");
                changed = true;
            }
        }

        if let Some((uid, gid)) = ids {
            let meta = fs::symlink_metadata(link).await.map_err(|e| DeployError::io(link, e))?;
            if meta.uid() != uid || meta.gid() != gid {
                // lchown: the link itself, never whatever it points at.
                std::os::unix::fs::lchown(link, Some(uid), Some(gid)).map_err(|e| DeployError::io(link, e))?;
                info!(link = %link.display(), "Link ownership fixed");
                changed = true;
            }
        }

        if !changed {
            debug!(link = %link.display(), "Link already up to date");
        }
        Ok(changed)
    }

    async fn remove_link(&self, link: &Path) -> DeployResult<bool> {
        match fs::symlink_metadata(link).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                fs::remove_file(link).await.map_err(|e| DeployError::io(link, e))?;
                info!(link = %link.display(), "🔗 Link removed");
                Ok(true)
            }
            Ok(_) => Err(DeployError::NotALink(link.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DeployError::io(link, e)),
        }
    }
}
