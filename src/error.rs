//! Error types for flakebox
//!
//! All modules use `FlakeboxResult<T>` as their return type.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for flakebox operations
pub type FlakeboxResult<T> = Result<T, FlakeboxError>;

/// A step of environment assembly, in the order it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStep {
    /// Make the base image available and start the container
    Instantiate,
    /// Apply environment variables and the working directory
    Configure,
    /// Create, seed and mount the store cache volume
    MountCache,
    /// Stage and copy the source tree into the container
    CopySource,
    /// Replace version-control history with a single fresh commit
    NormalizeRepository,
}

impl AssemblyStep {
    /// Human-readable step name used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instantiate => "instantiate base image",
            Self::Configure => "configure environment",
            Self::MountCache => "mount cache volume",
            Self::CopySource => "copy source tree",
            Self::NormalizeRepository => "normalize repository",
        }
    }
}

impl fmt::Display for AssemblyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error classes reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Base image or store snapshot unavailable, or the runtime is not usable
    Provisioning,
    /// The cache volume could not be created, locked or seeded
    CacheMount,
    /// A version-control command failed while normalizing the source
    Normalization,
    /// The devshell check itself failed
    Verification,
    /// Configuration, IO and everything else
    Other,
}

/// All errors that can occur in flakebox
#[derive(Error, Debug)]
pub enum FlakeboxError {
    // Environment errors
    #[error("Podman not found. Install it from https://podman.io")]
    PodmanNotFound,

    #[error("Unsupported platform: {0}. flakebox requires Linux with rootless Podman.")]
    UnsupportedPlatform(String),

    #[error("Podman rootless setup incomplete: {reason}")]
    PodmanRootlessSetup { reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigValue { key: String, reason: String },

    // Provisioning errors
    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Store snapshot unavailable: {path} in {image}: {reason}")]
    StoreSnapshot {
        image: String,
        path: String,
        reason: String,
    },

    #[error("Container failed to start: {0}")]
    ContainerStart(String),

    // Cache errors
    #[error("Failed to create cache volume {name}: {reason}")]
    CacheVolumeCreate { name: String, reason: String },

    #[error("Failed to seed cache volume {name}: {reason}")]
    CacheSeed { name: String, reason: String },

    #[error("Failed to lock cache volume {name}: {source}")]
    CacheLock {
        name: String,
        #[source]
        source: std::io::Error,
    },

    // Source and environment errors
    #[error("Source tree not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Failed to copy {path} into container: {reason}")]
    CopyIn { path: PathBuf, reason: String },

    #[error("Container command failed: {command}, exit code: {code}\n{output}")]
    ContainerCommand {
        command: String,
        code: i32,
        output: String,
    },

    #[error("Invalid environment pipeline: {0}")]
    Pipeline(String),

    #[error("environment assembly failed at step '{step}': {source}")]
    Assembly {
        step: AssemblyStep,
        #[source]
        source: Box<FlakeboxError>,
    },

    #[error("devshell check failed: {source}")]
    DevshellCheck {
        #[source]
        source: Box<FlakeboxError>,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlakeboxError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Wrap an error with the assembly step it happened in
    pub fn at_step(self, step: AssemblyStep) -> Self {
        Self::Assembly {
            step,
            source: Box::new(self),
        }
    }

    /// Wrap an error as a failed devshell check
    pub fn devshell_check(self) -> Self {
        Self::DevshellCheck {
            source: Box::new(self),
        }
    }

    /// Classify the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ImagePull { .. }
            | Self::StoreSnapshot { .. }
            | Self::ContainerStart(_)
            | Self::PodmanNotFound
            | Self::PodmanRootlessSetup { .. }
            | Self::UnsupportedPlatform(_) => ErrorCategory::Provisioning,
            Self::CacheVolumeCreate { .. } | Self::CacheSeed { .. } | Self::CacheLock { .. } => {
                ErrorCategory::CacheMount
            }
            Self::Assembly {
                step: AssemblyStep::NormalizeRepository,
                ..
            } => ErrorCategory::Normalization,
            Self::Assembly { source, .. } => source.category(),
            Self::DevshellCheck { .. } => ErrorCategory::Verification,
            _ => ErrorCategory::Other,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PodmanNotFound => Some("Install podman with your distribution's package manager"),
            Self::PodmanRootlessSetup { .. } => Some("Run: podman system migrate"),
            Self::Assembly { source, .. } | Self::DevshellCheck { source } => source.hint(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FlakeboxError::PodmanNotFound;
        assert!(err.to_string().contains("Podman not found"));
    }

    #[test]
    fn assembly_error_names_step() {
        let err = FlakeboxError::ImagePull {
            image: "nixos/nix:latest".to_string(),
            reason: "manifest unknown".to_string(),
        }
        .at_step(AssemblyStep::Instantiate);

        let msg = err.to_string();
        assert!(msg.contains("instantiate base image"));
        assert!(msg.contains("manifest unknown"));
        assert_eq!(err.category(), ErrorCategory::Provisioning);
    }

    #[test]
    fn normalization_category() {
        let err = FlakeboxError::ContainerCommand {
            command: "git commit".to_string(),
            code: 128,
            output: "fatal: no space left on device".to_string(),
        }
        .at_step(AssemblyStep::NormalizeRepository);

        assert_eq!(err.category(), ErrorCategory::Normalization);
    }

    #[test]
    fn cache_errors_are_cache_mount_failures() {
        let err = FlakeboxError::CacheVolumeCreate {
            name: "nix".to_string(),
            reason: "disk full".to_string(),
        }
        .at_step(AssemblyStep::MountCache);

        assert_eq!(err.category(), ErrorCategory::CacheMount);
    }

    #[test]
    fn devshell_check_keeps_cause() {
        let err = FlakeboxError::ContainerCommand {
            command: "nix develop".to_string(),
            code: 1,
            output: String::new(),
        }
        .devshell_check();

        assert!(err.to_string().starts_with("devshell check failed"));
        assert_eq!(err.category(), ErrorCategory::Verification);

        let source = std::error::Error::source(&err).expect("cause preserved");
        assert!(source.to_string().contains("exit code: 1"));
    }

    #[test]
    fn error_hint_passes_through_wrappers() {
        let err = FlakeboxError::PodmanNotFound
            .at_step(AssemblyStep::Instantiate)
            .devshell_check();
        assert!(err.hint().is_some());
        assert_eq!(FlakeboxError::Internal("x".to_string()).hint(), None);
    }
}
