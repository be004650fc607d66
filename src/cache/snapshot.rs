//! Base store snapshot
//!
//! Resolves the pristine `/nix` tree (store plus database) of the base image.
//! The reference depends on nothing but the image and the store path, so it
//! is computed once per provider and shared by every caller.

use crate::error::{FlakeboxError, FlakeboxResult};
use crate::orchestration::{ContainerRuntime, DirectoryRef};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Reference to the store subtree of the base image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSnapshot {
    /// The store directory inside the base image
    pub directory: DirectoryRef,
}

/// Memoizing provider of the base image's store snapshot
#[derive(Debug)]
pub struct StoreSnapshotProvider {
    image: String,
    store_path: String,
    snapshot: OnceCell<Arc<StoreSnapshot>>,
}

impl StoreSnapshotProvider {
    /// Create a provider for `store_path` inside `image`
    pub fn new(image: impl Into<String>, store_path: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            store_path: store_path.into(),
            snapshot: OnceCell::new(),
        }
    }

    /// Get the snapshot, capturing it on first use.
    ///
    /// Concurrent callers wait for the same capture and share its result.
    /// A failed capture is not cached, so a later call tries again.
    pub async fn get(&self, runtime: &dyn ContainerRuntime) -> FlakeboxResult<Arc<StoreSnapshot>> {
        self.snapshot
            .get_or_try_init(|| self.capture(runtime))
            .await
            .cloned()
    }

    async fn capture(&self, runtime: &dyn ContainerRuntime) -> FlakeboxResult<Arc<StoreSnapshot>> {
        if !runtime.image_exists(&self.image).await? {
            runtime.pull_image(&self.image).await?;
        }

        if !runtime
            .directory_exists(&self.image, &self.store_path)
            .await?
        {
            return Err(FlakeboxError::StoreSnapshot {
                image: self.image.clone(),
                path: self.store_path.clone(),
                reason: "not a directory in the image".to_string(),
            });
        }

        debug!("Captured store snapshot {}:{}", self.image, self.store_path);

        Ok(Arc::new(StoreSnapshot {
            directory: DirectoryRef {
                image: self.image.clone(),
                path: self.store_path.clone(),
            },
        }))
    }
}
