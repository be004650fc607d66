//! In-memory container runtime for tests
//!
//! Records every backend call and emulates just enough of a Nix container
//! (git, printenv, `nix develop`) to exercise the assembler end to end.

use crate::error::{FlakeboxError, FlakeboxResult};
use crate::orchestration::podman::{ContainerConfig, DirectoryRef};
use crate::orchestration::runtime::{ContainerRuntime, VolumeInfo};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

pub(crate) const FAKE_IMAGE: &str = "nixos/nix:latest";

#[derive(Debug, Default, Clone)]
pub(crate) struct FakeVolume {
    pub labels: HashMap<String, String>,
    pub files: BTreeSet<String>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct FakeGit {
    pub initialized: bool,
    pub email: Option<String>,
    pub name: Option<String>,
    pub staged: bool,
    pub commits: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeContainer {
    pub config: ContainerConfig,
    pub files: BTreeSet<String>,
    pub git: FakeGit,
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    /// Images present locally
    pub images: HashSet<String>,
    /// Images a pull can fetch, with the directories they contain
    pub registry: HashMap<String, Vec<String>>,
    pub volumes: HashMap<String, FakeVolume>,
    pub containers: HashMap<String, FakeContainer>,
    pub removed: Vec<String>,
    /// Backend calls in order
    pub log: Vec<String>,
    pub pulls: usize,
    pub seeds: usize,
    pub fail_volume_create: bool,
    /// Git subcommand that exits non-zero
    pub fail_git: Option<String>,
    /// Exit code for the scripted devshell check
    pub devshell_exit: Option<i32>,
    next_id: usize,
}

pub(crate) struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state
            .registry
            .insert(FAKE_IMAGE.to_string(), vec!["/nix".to_string()]);
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_state(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn seeds(&self) -> usize {
        self.state.lock().unwrap().seeds
    }

    pub fn pulls(&self) -> usize {
        self.state.lock().unwrap().pulls
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn container(&self, id: &str) -> Option<FakeContainer> {
        self.state.lock().unwrap().containers.get(id).cloned()
    }

    pub fn volume(&self, name: &str) -> Option<FakeVolume> {
        self.state.lock().unwrap().volumes.get(name).cloned()
    }

    fn record(&self, entry: impl Into<String>) {
        self.state.lock().unwrap().log.push(entry.into());
    }
}

fn walk(root: &Path, dir: &Path, out: &mut BTreeSet<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Ok(rel) = path.strip_prefix(root) {
            out.insert(rel.to_string_lossy().to_string());
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            walk(root, &path, out);
        }
    }
}

fn failed(code: i32, output: impl Into<String>) -> Result<String, (i32, String)> {
    Err((code, output.into()))
}

/// Emulate one command inside a container
fn emulate(
    state: &FakeState,
    container: &mut FakeContainer,
    command: &[String],
) -> Result<String, (i32, String)> {
    let args: Vec<&str> = command.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["rm", "-rf", ".git"] => {
            container
                .files
                .retain(|f| f != ".git" && !f.starts_with(".git/"));
            container.git = FakeGit::default();
            Ok(String::new())
        }
        ["git", sub, rest @ ..] => {
            if state.fail_git.as_deref() == Some(*sub) {
                return failed(128, format!("fatal: git {} failed", sub));
            }
            let git = &mut container.git;
            match (*sub, rest) {
                ("init", _) => {
                    git.initialized = true;
                    Ok("Initialized empty Git repository in /workspace/.git/\n".to_string())
                }
                ("config", ["user.email", value]) if git.initialized => {
                    git.email = Some(value.to_string());
                    Ok(String::new())
                }
                ("config", ["user.name", value]) if git.initialized => {
                    git.name = Some(value.to_string());
                    Ok(String::new())
                }
                ("add", ["-A"]) if git.initialized => {
                    git.staged = true;
                    Ok(String::new())
                }
                ("commit", [.., "-m", message]) if git.staged => {
                    if git.email.is_none() || git.name.is_none() {
                        return failed(128, "Author identity unknown");
                    }
                    git.commits.push(message.to_string());
                    Ok(String::new())
                }
                _ => failed(128, "fatal: not a git repository"),
            }
        }
        ["printenv", name] => match container.config.env.get(*name) {
            Some(value) => Ok(format!("{}\n", value)),
            None => failed(1, ""),
        },
        ["nix", "develop", "--command", "sh", "-c", script] => {
            let store_mounted = container.config.volumes.iter().any(|v| {
                let volume = v.split(':').next().unwrap_or_default();
                v.ends_with(":/nix")
                    && state
                        .volumes
                        .get(volume)
                        .is_some_and(|vol| vol.files.contains("store"))
            });
            if !store_mounted {
                return failed(1, "error: opening Nix database: no such file");
            }
            let flakes = container
                .config
                .env
                .get("NIX_CONFIG")
                .is_some_and(|c| c.contains("flakes"));
            if !flakes {
                return failed(1, "error: experimental Nix feature 'flakes' is disabled");
            }
            if container.git.commits.is_empty() || !container.files.contains("flake.nix") {
                return failed(1, "error: path '/workspace' is not a flake");
            }
            if let Some(code) = state.devshell_exit {
                return failed(code, "check: tool missing");
            }

            let mut out = String::new();
            for part in script.split(" && ") {
                let part = part.trim();
                if let Some(text) = part.strip_prefix("echo ") {
                    out.push_str(text.trim_matches('\''));
                } else if part.starts_with("go ") {
                    out.push_str("go version go1.22.5 linux/amd64");
                } else if part.starts_with("qemu-system-x86_64 ") {
                    out.push_str("QEMU emulator version 8.2.2");
                } else {
                    return failed(127, format!("sh: {}: not found", part));
                }
                out.push('\n');
            }
            Ok(out)
        }
        _ => failed(127, format!("{}: not found", command.join(" "))),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ensure_ready(&self) -> FlakeboxResult<()> {
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> FlakeboxResult<bool> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> FlakeboxResult<()> {
        self.record(format!("pull {}", image));
        let mut state = self.state.lock().unwrap();
        state.pulls += 1;
        if state.registry.contains_key(image) {
            state.images.insert(image.to_string());
            Ok(())
        } else {
            Err(FlakeboxError::ImagePull {
                image: image.to_string(),
                reason: "manifest unknown".to_string(),
            })
        }
    }

    async fn directory_exists(&self, image: &str, path: &str) -> FlakeboxResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .registry
            .get(image)
            .is_some_and(|dirs| dirs.iter().any(|d| d == path)))
    }

    async fn run(&self, config: &ContainerConfig, command: &[String]) -> FlakeboxResult<String> {
        self.record(format!("run {} {}", config.image, command.join(" ")));
        let mut state = self.state.lock().unwrap();
        if !state.images.contains(&config.image) {
            return Err(FlakeboxError::ContainerStart(format!(
                "image not known: {}",
                config.image
            )));
        }
        for mount in &config.volumes {
            let name = mount.split(':').next().unwrap_or_default();
            if !state.volumes.contains_key(name) {
                return Err(FlakeboxError::ContainerStart(format!(
                    "no such volume: {}",
                    name
                )));
            }
        }
        state.next_id += 1;
        let id = format!("fake{:08}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                config: config.clone(),
                files: BTreeSet::new(),
                git: FakeGit::default(),
            },
        );
        Ok(id)
    }

    async fn copy_into(
        &self,
        container_id: &str,
        host_dir: &Path,
        container_path: &str,
    ) -> FlakeboxResult<()> {
        self.record(format!("copy {}", container_path));
        let mut files = BTreeSet::new();
        walk(host_dir, host_dir, &mut files);

        let mut state = self.state.lock().unwrap();
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| FlakeboxError::CopyIn {
                path: host_dir.to_path_buf(),
                reason: "no such container".to_string(),
            })?;
        container.files.extend(files);
        Ok(())
    }

    async fn exec(
        &self,
        container_id: &str,
        _workdir: Option<&str>,
        command: &[String],
    ) -> FlakeboxResult<String> {
        self.record(format!("exec {}", command.join(" ")));
        let mut state = self.state.lock().unwrap();
        let mut container = state
            .containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| FlakeboxError::command_exec("exec", "no such container"))?;

        let result = emulate(&state, &mut container, command);
        state.containers.insert(container_id.to_string(), container);

        result.map_err(|(code, output)| FlakeboxError::ContainerCommand {
            command: command.join(" "),
            code,
            output,
        })
    }

    async fn remove(&self, container_id: &str) -> FlakeboxResult<()> {
        self.record(format!("remove {}", container_id));
        let mut state = self.state.lock().unwrap();
        state.containers.remove(container_id);
        state.removed.push(container_id.to_string());
        Ok(())
    }

    async fn volume_create(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> FlakeboxResult<()> {
        self.record(format!("volume create {}", name));
        let mut state = self.state.lock().unwrap();
        if state.fail_volume_create {
            return Err(FlakeboxError::CacheVolumeCreate {
                name: name.to_string(),
                reason: "no space left on device".to_string(),
            });
        }
        state.volumes.entry(name.to_string()).or_insert(FakeVolume {
            labels: labels.clone(),
            files: BTreeSet::new(),
        });
        Ok(())
    }

    async fn volume_inspect(&self, name: &str) -> FlakeboxResult<Option<VolumeInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state.volumes.get(name).map(|vol| VolumeInfo {
            name: name.to_string(),
            labels: vol.labels.clone(),
            mountpoint: None,
            created_at: None,
        }))
    }

    async fn volume_contains(
        &self,
        name: &str,
        _probe_image: &str,
        relative_path: &str,
    ) -> FlakeboxResult<bool> {
        let state = self.state.lock().unwrap();
        Ok(state
            .volumes
            .get(name)
            .is_some_and(|vol| vol.files.contains(relative_path)))
    }

    async fn seed_volume(
        &self,
        name: &str,
        source: &DirectoryRef,
        marker: &str,
    ) -> FlakeboxResult<()> {
        self.record(format!("seed {} from {}", name, source));
        {
            let mut state = self.state.lock().unwrap();
            state.seeds += 1;
            let volume = state
                .volumes
                .get_mut(name)
                .ok_or_else(|| FlakeboxError::CacheSeed {
                    name: name.to_string(),
                    reason: "no such volume".to_string(),
                })?;
            volume.files.insert("store".to_string());
            volume.files.insert("var/nix/db".to_string());
        }

        // Give concurrent assemblies a chance to interleave mid-seed
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if let Some(volume) = state.volumes.get_mut(name) {
            volume.files.insert(marker.to_string());
        }
        Ok(())
    }

    fn runtime_name(&self) -> &'static str {
        "Fake"
    }
}
