//! Native Podman container runtime for Linux
//!
//! Implements the ContainerRuntime trait using direct Podman execution.
//! Requires rootless Podman to be properly configured.

use crate::error::{FlakeboxError, FlakeboxResult};
use crate::orchestration::command_error_output;
use crate::orchestration::podman::{ContainerConfig, DirectoryRef};
use crate::orchestration::runtime::{ContainerRuntime, VolumeInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Exit code podman reports for its own failures (as opposed to the command's)
const PODMAN_ERROR_CODE: i32 = 125;

/// Container runtime using native rootless Podman
pub struct NativePodmanRuntime;

impl NativePodmanRuntime {
    /// Create a new native Podman runtime
    pub fn new() -> Self {
        Self
    }

    /// Check if Podman is installed
    async fn podman_installed() -> bool {
        Command::new("podman")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Check if rootless Podman is properly configured
    async fn rootless_configured() -> FlakeboxResult<bool> {
        let output = Command::new("podman")
            .args(["info", "--format", "{{.Host.Security.Rootless}}"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| FlakeboxError::command_failed("podman info", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.trim() == "true")
    }

    /// Execute a Podman command and return the output
    async fn exec_podman(&self, args: &[&str]) -> FlakeboxResult<std::process::Output> {
        debug!("Executing: podman {:?}", args);

        Command::new("podman")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| FlakeboxError::command_failed(format!("podman {:?}", args), e))
    }

    /// Run a throwaway container and report whether its command succeeded.
    ///
    /// Podman's own failures (exit 125) are errors rather than `false`.
    async fn probe(&self, args: &[&str]) -> FlakeboxResult<bool> {
        let output = self.exec_podman(args).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(PODMAN_ERROR_CODE) | None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(FlakeboxError::command_exec(
                    format!("podman {}", args.join(" ")),
                    stderr,
                ))
            }
            Some(_) => Ok(false),
        }
    }

    /// Parse one entry of `podman volume inspect` / `ls` JSON
    fn parse_volume(vol: &serde_json::Value) -> VolumeInfo {
        let labels: HashMap<String, String> = vol["Labels"]
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        VolumeInfo {
            name: vol["Name"].as_str().unwrap_or_default().to_string(),
            labels,
            mountpoint: vol["Mountpoint"].as_str().map(String::from),
            created_at: vol["CreatedAt"].as_str().map(String::from),
        }
    }

    /// Append name, workdir, network, volumes, env, image and command to `args`
    fn push_container_args(args: &mut Vec<String>, config: &ContainerConfig, command: &[String]) {
        if let Some(ref name) = config.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        if let Some(ref workdir) = config.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }
        args.push("--network".to_string());
        args.push(config.network.clone());

        for v in &config.volumes {
            args.push("-v".to_string());
            args.push(v.clone());
        }
        for (k, v) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push(config.image.clone());
        args.extend(command.iter().cloned());
    }
}

impl Default for NativePodmanRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for NativePodmanRuntime {
    async fn ensure_ready(&self) -> FlakeboxResult<()> {
        if !Self::podman_installed().await {
            return Err(FlakeboxError::PodmanNotFound);
        }

        if !Self::rootless_configured().await? {
            return Err(FlakeboxError::PodmanRootlessSetup {
                reason: "Rootless Podman not configured".to_string(),
            });
        }

        Ok(())
    }

    async fn image_exists(&self, image: &str) -> FlakeboxResult<bool> {
        let output = self.exec_podman(&["image", "exists", image]).await?;
        Ok(output.status.success())
    }

    async fn pull_image(&self, image: &str) -> FlakeboxResult<()> {
        info!("Pulling image: {}", image);

        let output = self.exec_podman(&["pull", image]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(FlakeboxError::ImagePull {
                image: image.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn directory_exists(&self, image: &str, path: &str) -> FlakeboxResult<bool> {
        self.probe(&[
            "run", "--rm", "--network", "none", image, "test", "-d", path,
        ])
        .await
    }

    async fn run(&self, config: &ContainerConfig, command: &[String]) -> FlakeboxResult<String> {
        let mut args = vec!["run".to_string(), "-d".to_string(), "--rm".to_string()];
        Self::push_container_args(&mut args, config, command);

        debug!("Running container: podman {:?}", args);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec_podman(&args_refs).await?;

        if output.status.success() {
            let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!(
                "Container started: {}",
                &container_id[..12.min(container_id.len())]
            );
            Ok(container_id)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(FlakeboxError::ContainerStart(stderr.trim().to_string()))
        }
    }

    async fn copy_into(
        &self,
        container_id: &str,
        host_dir: &Path,
        container_path: &str,
    ) -> FlakeboxResult<()> {
        // "<dir>/." copies the directory's contents rather than the directory
        let source = format!("{}/.", host_dir.display());
        let target = format!("{}:{}", container_id, container_path);

        let output = self.exec_podman(&["cp", &source, &target]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(FlakeboxError::CopyIn {
                path: host_dir.to_path_buf(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn exec(
        &self,
        container_id: &str,
        workdir: Option<&str>,
        command: &[String],
    ) -> FlakeboxResult<String> {
        let mut args = vec!["exec"];
        if let Some(dir) = workdir {
            args.push("-w");
            args.push(dir);
        }
        args.push(container_id);
        args.extend(command.iter().map(String::as_str));

        let output = self.exec_podman(&args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(FlakeboxError::ContainerCommand {
                command: command.join(" "),
                code: output.status.code().unwrap_or(-1),
                output: command_error_output(&stdout, &stderr),
            })
        }
    }

    async fn remove(&self, container_id: &str) -> FlakeboxResult<()> {
        debug!("Removing container: {}", container_id);

        let output = self.exec_podman(&["rm", "-f", container_id]).await?;

        if output.status.success() {
            Ok(())
        } else {
            // Ignore error if container doesn't exist
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such container") {
                Ok(())
            } else {
                Err(FlakeboxError::command_exec("podman rm", stderr))
            }
        }
    }

    async fn volume_create(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> FlakeboxResult<()> {
        debug!("Creating volume: {}", name);

        let mut args = vec!["volume", "create", "--ignore"];

        let label_strings: Vec<String> =
            labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        for label in &label_strings {
            args.push("--label");
            args.push(label);
        }

        args.push(name);

        let output = self.exec_podman(&args).await?;

        if output.status.success() {
            debug!("Volume created: {}", name);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(FlakeboxError::CacheVolumeCreate {
                name: name.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn volume_inspect(&self, name: &str) -> FlakeboxResult<Option<VolumeInfo>> {
        let output = self
            .exec_podman(&["volume", "inspect", name, "--format", "json"])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such volume") {
                return Ok(None);
            }
            return Err(FlakeboxError::command_exec("podman volume inspect", stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);

        // inspect returns an array even for a single volume
        let volumes: Vec<serde_json::Value> = serde_json::from_str(&stdout)?;

        Ok(volumes.first().map(Self::parse_volume))
    }

    async fn volume_contains(
        &self,
        name: &str,
        probe_image: &str,
        relative_path: &str,
    ) -> FlakeboxResult<bool> {
        let mount = format!("{}:/probe:ro", name);
        let path = format!("/probe/{}", relative_path);
        self.probe(&[
            "run", "--rm", "--network", "none", "-v", &mount, probe_image, "test", "-e", &path,
        ])
        .await
    }

    async fn seed_volume(
        &self,
        name: &str,
        source: &DirectoryRef,
        marker: &str,
    ) -> FlakeboxResult<()> {
        info!("Seeding cache volume {} from {}", name, source);

        let mount = format!("{}:/seed", name);
        let from = format!("{}/.", source.path);
        let marker_path = format!("/seed/{}", marker);

        let steps: [&[&str]; 2] = [
            &["cp", "-a", from.as_str(), "/seed/"],
            &["touch", marker_path.as_str()],
        ];

        for step in steps {
            let mut args = vec!["run", "--rm", "--network", "none", "-v", mount.as_str()];
            args.push(source.image.as_str());
            args.extend_from_slice(step);

            let output = self.exec_podman(&args).await?;
            if !output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(FlakeboxError::CacheSeed {
                    name: name.to_string(),
                    reason: command_error_output(&stdout, &stderr),
                });
            }
        }

        Ok(())
    }

    fn runtime_name(&self) -> &'static str {
        "Native Podman"
    }
}
