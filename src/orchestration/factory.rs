//! Runtime factory for creating platform-appropriate container runtimes
//!
//! Provides automatic platform detection and runtime instantiation.

use crate::error::{FlakeboxError, FlakeboxResult};
use crate::orchestration::native_podman::NativePodmanRuntime;
use crate::orchestration::runtime::ContainerRuntime;

/// Detected platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux - uses native rootless Podman
    Linux,
    /// Unsupported platform
    Unsupported,
}

impl Platform {
    /// Detect the current platform
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            _ => Platform::Unsupported,
        }
    }

    /// Get a human-readable platform name
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::Unsupported => "Unsupported",
        }
    }
}

/// Create a container runtime appropriate for the current platform
pub fn create_runtime() -> FlakeboxResult<Box<dyn ContainerRuntime>> {
    match Platform::detect() {
        Platform::Linux => Ok(Box::new(NativePodmanRuntime::new())),
        Platform::Unsupported => Err(FlakeboxError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        )),
    }
}
