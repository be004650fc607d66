//! Podman shared types
//!
//! Contains data structures used by container runtimes.
//! The actual Podman execution logic is in the runtime implementations.

use std::collections::BTreeMap;
use std::fmt;

/// Container configuration for starting an environment container
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Container image to use
    pub image: String,
    /// Container name
    pub name: Option<String>,
    /// Working directory inside the container
    pub workdir: Option<String>,
    /// Volume mounts (volume:container format)
    pub volumes: Vec<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Network mode
    pub network: String,
}

impl ContainerConfig {
    /// Create a config for `image` with no mounts or environment
    pub fn new(image: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: None,
            workdir: None,
            volumes: Vec::new(),
            env: BTreeMap::new(),
            network: network.into(),
        }
    }
}

/// A directory inside an image, usable as a standalone copy source.
///
/// The reference is lazy: nothing is extracted until a runtime copies it
/// somewhere, e.g. while seeding a volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectoryRef {
    /// Image the directory lives in
    pub image: String,
    /// Absolute path of the directory inside the image
    pub path: String,
}

impl fmt::Display for DirectoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.image, self.path)
    }
}
