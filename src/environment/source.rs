//! Source tree input
//!
//! The flake directory as checked out on the host. It is copied into the
//! environment, never mounted: a filtered copy is staged on the host first
//! and that copy is transferred into the container.

use crate::error::{FlakeboxError, FlakeboxResult};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Top-level entries never copied: build output, VCS metadata, result
/// symlinks and direnv caches
pub const DEFAULT_EXCLUDES: &[&str] = &["build", ".git", "result", ".direnv"];

/// A host directory to build the environment from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    root: PathBuf,
    exclude: Vec<String>,
}

impl SourceTree {
    /// Create a source tree rooted at `root` with the default exclusions
    pub fn new(root: impl AsRef<Path>) -> FlakeboxResult<Self> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|_| FlakeboxError::SourceNotFound(root.to_path_buf()))?;

        if !canonical.is_dir() {
            return Err(FlakeboxError::SourceNotFound(root.to_path_buf()));
        }

        Ok(Self {
            root: canonical,
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the exclusion list
    pub fn with_excludes<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    /// Root directory on the host
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a path relative to the root is left out of the copy
    pub fn is_excluded(&self, relative: &Path) -> bool {
        match relative.components().next() {
            Some(Component::Normal(first)) => self
                .exclude
                .iter()
                .any(|e| first.to_str() == Some(e.as_str())),
            _ => false,
        }
    }

    /// Copy the tree, minus exclusions, into a fresh directory under
    /// `staging_root`
    pub async fn stage(&self, staging_root: &Path) -> FlakeboxResult<StagedSource> {
        let dir = staging_root.join(uuid::Uuid::new_v4().to_string());
        let source = self.clone();
        let target = dir.clone();

        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&target)?;
            source.copy_dir(&source.root, &target)
        })
        .await
        .map_err(|e| FlakeboxError::Internal(format!("staging task failed: {}", e)))?
        .map_err(|e| FlakeboxError::io(format!("staging {}", self.root.display()), e))?;

        debug!("Staged {} at {}", self.root.display(), dir.display());
        Ok(StagedSource { path: dir })
    }

    fn copy_dir(&self, from: &Path, to: &Path) -> io::Result<()> {
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            if self.is_excluded(relative) {
                continue;
            }

            let target = to.join(entry.file_name());
            let file_type = entry.file_type()?;

            if file_type.is_symlink() {
                std::os::unix::fs::symlink(fs::read_link(&path)?, &target)?;
            } else if file_type.is_dir() {
                fs::create_dir(&target)?;
                self.copy_dir(&path, &target)?;
            } else {
                fs::copy(&path, &target)?;
            }
        }
        Ok(())
    }
}

/// A staged copy of a source tree, removed by `cleanup`
#[derive(Debug)]
pub struct StagedSource {
    path: PathBuf,
}

impl StagedSource {
    /// Directory holding the staged copy
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staged copy (best-effort)
    pub async fn cleanup(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.path).await {
            warn!("Failed to remove staging dir {}: {}", self.path.display(), e);
        }
    }
}
