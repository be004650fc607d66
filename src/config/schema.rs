//! Configuration schema for flakebox
//!
//! Configuration is stored at `~/.config/flakebox/config.toml`, optionally
//! overlaid by a project-local `.flakebox.toml`.

use crate::error::{FlakeboxError, FlakeboxResult};
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base image settings
    pub image: ImageConfig,

    /// Container settings
    pub container: ContainerConfig,

    /// Store cache settings
    pub cache: CacheConfig,

    /// Nix settings
    pub nix: NixConfig,

    /// Source tree settings
    pub source: SourceConfig,

    /// Repository normalization settings
    pub repository: RepositoryConfig,

    /// Devshell check settings
    pub devshell: DevshellConfig,
}

impl Config {
    /// Check values that would otherwise fail deep inside a podman call
    pub fn validate(&self) -> FlakeboxResult<()> {
        if self.image.base.trim().is_empty() {
            return Err(invalid("image.base", "must not be empty"));
        }
        for (key, path) in [
            ("image.store_path", &self.image.store_path),
            ("container.workdir", &self.container.workdir),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(key, format!("'{}' is not an absolute path", path)));
            }
        }
        if !is_valid_volume_name(&self.cache.volume) {
            return Err(invalid(
                "cache.volume",
                format!(
                    "'{}' must match [A-Za-z0-9][A-Za-z0-9_.-]*",
                    self.cache.volume
                ),
            ));
        }
        if self.repository.user_name.trim().is_empty()
            || self.repository.user_email.trim().is_empty()
        {
            return Err(invalid("repository", "committer identity must not be empty"));
        }
        if self.repository.message.trim().is_empty() {
            return Err(invalid("repository.message", "commit message must not be empty"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> FlakeboxError {
    FlakeboxError::ConfigValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Podman's volume name rule
fn is_valid_volume_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Base image configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image providing the package manager
    pub base: String,

    /// Store root inside the image, mounted from the cache volume
    pub store_path: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base: "nixos/nix:latest".to_string(),
            store_path: "/nix".to_string(),
        }
    }
}

/// Container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Network mode
    pub network: String,

    /// Working directory the source is copied to
    pub workdir: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            network: "host".to_string(),
            workdir: "/workspace".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the persistent store volume
    pub volume: String,

    /// Suffix the volume name with a hash of the base image
    pub versioned: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            volume: "nix".to_string(),
            versioned: false,
        }
    }
}

/// Nix settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NixConfig {
    /// Value of `NIX_CONFIG` inside the environment
    pub config: String,
}

impl Default for NixConfig {
    fn default() -> Self {
        Self {
            config: "experimental-features = nix-command flakes".to_string(),
        }
    }
}

/// Source tree settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Top-level entries left out of the copied tree
    pub exclude: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            exclude: crate::environment::DEFAULT_EXCLUDES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Identity and message of the synthetic commit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Committer name
    pub user_name: String,

    /// Committer email
    pub user_email: String,

    /// Commit message
    pub message: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            user_name: "CI".to_string(),
            user_email: "ci@stereos.ai".to_string(),
            message: "init-flake".to_string(),
        }
    }
}

/// A tool whose version the devshell check prints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCheck {
    /// Display name
    pub name: String,

    /// Shell command printing the version
    pub command: String,
}

impl ToolCheck {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Devshell check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevshellConfig {
    /// Line printed once the shell is up
    pub ready_marker: String,

    /// Tools expected in the shell
    pub tools: Vec<ToolCheck>,
}

impl Default for DevshellConfig {
    fn default() -> Self {
        Self {
            ready_marker: "devshell ok".to_string(),
            tools: vec![
                ToolCheck::new("go", "go version"),
                ToolCheck::new("qemu", "qemu-system-x86_64 --version | head -1"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[image]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[[devshell.tools]]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.image.base, "nixos/nix:latest");
        assert_eq!(config.cache.volume, "nix");
        assert_eq!(config.source.exclude, vec!["build", ".git", "result", ".direnv"]);
        config.validate().unwrap();
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            versioned = true

            [devshell]
            tools = [{ name = "rustc", command = "rustc --version" }]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.cache.versioned);
        assert_eq!(config.cache.volume, "nix"); // default preserved
        assert_eq!(config.devshell.ready_marker, "devshell ok");
        assert_eq!(
            config.devshell.tools,
            vec![ToolCheck::new("rustc", "rustc --version")]
        );
    }

    #[test]
    fn validate_rejects_bad_volume_name() {
        let mut config = Config::default();
        config.cache.volume = "-nix".to_string();
        assert!(matches!(
            config.validate(),
            Err(FlakeboxError::ConfigValue { .. })
        ));

        config.cache.volume = "nix store".to_string();
        assert!(config.validate().is_err());

        config.cache.volume = "nix_store-2.24".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_commit_message() {
        let mut config = Config::default();
        config.repository.message = "  ".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, FlakeboxError::ConfigValue { .. }));
        assert!(err.to_string().contains("repository.message"));
    }

    #[test]
    fn validate_rejects_relative_paths() {
        let mut config = Config::default();
        config.container.workdir = "workspace".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("container.workdir"));
    }
}
