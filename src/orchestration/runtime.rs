//! Container runtime abstraction
//!
//! The execution backend the environment assembler is written against.
//! Everything flakebox needs from its host runtime goes through this trait,
//! so the core can be exercised with a substitute backend.

use crate::error::FlakeboxResult;
use crate::orchestration::podman::{ContainerConfig, DirectoryRef};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Information about a named volume
#[derive(Debug, Clone, Default)]
pub struct VolumeInfo {
    /// Volume name
    pub name: String,
    /// Labels attached at creation
    pub labels: HashMap<String, String>,
    /// Host mountpoint, if reported
    pub mountpoint: Option<String>,
    /// Creation time as reported by the runtime
    pub created_at: Option<String>,
}

/// Abstract container runtime interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ensure the runtime is ready (installed, rootless configured)
    async fn ensure_ready(&self) -> FlakeboxResult<()>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> FlakeboxResult<bool>;

    /// Pull an image by reference
    async fn pull_image(&self, image: &str) -> FlakeboxResult<()>;

    /// Check whether `path` is a directory inside `image`
    async fn directory_exists(&self, image: &str, path: &str) -> FlakeboxResult<bool>;

    /// Start a detached container and return its ID
    async fn run(&self, config: &ContainerConfig, command: &[String]) -> FlakeboxResult<String>;

    /// Copy the contents of a host directory to `container_path`
    async fn copy_into(
        &self,
        container_id: &str,
        host_dir: &Path,
        container_path: &str,
    ) -> FlakeboxResult<()>;

    /// Execute a command in a running container, returning stdout.
    ///
    /// A non-zero exit status is an error.
    async fn exec(
        &self,
        container_id: &str,
        workdir: Option<&str>,
        command: &[String],
    ) -> FlakeboxResult<String>;

    /// Remove a container, stopping it if needed
    async fn remove(&self, container_id: &str) -> FlakeboxResult<()>;

    /// Create a named volume (no-op if it already exists)
    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>)
        -> FlakeboxResult<()>;

    /// Inspect a volume, `None` if it does not exist
    async fn volume_inspect(&self, name: &str) -> FlakeboxResult<Option<VolumeInfo>>;

    /// Check whether `relative_path` exists at the root of a volume
    async fn volume_contains(
        &self,
        name: &str,
        probe_image: &str,
        relative_path: &str,
    ) -> FlakeboxResult<bool>;

    /// Copy `source` into the root of a volume, then create `marker` there.
    ///
    /// The marker is written only after the copy succeeded.
    async fn seed_volume(
        &self,
        name: &str,
        source: &DirectoryRef,
        marker: &str,
    ) -> FlakeboxResult<()>;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
