//! Build-environment assembler
//!
//! Realizes an `EnvironmentSpec` against a container runtime: base image,
//! `NIX_CONFIG`, the seeded store cache at `/nix`, the source tree at the
//! workdir, and a fresh single-commit repository there. A failure at any
//! step removes whatever was started and reports the step.

use crate::cache::{CacheVolume, SeedOutcome, StoreSnapshotProvider};
use crate::config::{Config, ConfigManager};
use crate::environment::source::SourceTree;
use crate::environment::spec::{CommitIdentity, EnvironmentSpec, Step};
use crate::error::{AssemblyStep, FlakeboxError, FlakeboxResult};
use crate::orchestration::{ContainerConfig, ContainerRuntime};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Command keeping the environment container alive between execs
const KEEPALIVE: [&str; 2] = ["sleep", "infinity"];

/// Fixed shape of the environments an assembler builds
#[derive(Debug, Clone)]
pub struct EnvironmentLayout {
    /// Base image providing Nix
    pub base_image: String,
    /// Store root inside the image
    pub store_path: String,
    /// Value of `NIX_CONFIG`
    pub nix_config: String,
    /// Where the source tree lands
    pub workdir: String,
    /// Container network mode
    pub network: String,
    /// Persistent store volume
    pub volume: CacheVolume,
    /// Synthetic commit identity
    pub identity: CommitIdentity,
}

impl EnvironmentLayout {
    /// Derive the layout from configuration
    pub fn from_config(config: &Config) -> Self {
        let name = crate::cache::volume_name(
            &config.cache.volume,
            &config.image.base,
            config.cache.versioned,
        );
        Self {
            base_image: config.image.base.clone(),
            store_path: config.image.store_path.clone(),
            nix_config: config.nix.config.clone(),
            workdir: config.container.workdir.clone(),
            network: config.container.network.clone(),
            volume: CacheVolume::new(name, &config.image.base),
            identity: CommitIdentity {
                name: config.repository.user_name.clone(),
                email: config.repository.user_email.clone(),
                message: config.repository.message.clone(),
            },
        }
    }

    /// The pipeline for `source`, in the order it must run
    pub fn spec_for(&self, source: &SourceTree) -> EnvironmentSpec {
        // NIX_CONFIG instead of /etc/nix/nix.conf: that file links into the
        // store, which the cache mount replaces
        EnvironmentSpec::from_image(&self.base_image)
            .with_env_variable("NIX_CONFIG", &self.nix_config)
            .with_mounted_cache(&self.store_path, self.volume.clone())
            .with_directory(&self.workdir, source.clone())
            .with_workdir(&self.workdir)
            .with_fresh_repository(self.identity.clone())
    }
}

/// Commands that replace any history at the workdir with one commit
pub fn normalize_commands(identity: &CommitIdentity) -> Vec<Vec<String>> {
    let cmd = |args: &[&str]| args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    vec![
        cmd(&["rm", "-rf", ".git"]),
        cmd(&["git", "init", "-q"]),
        cmd(&["git", "config", "user.email", identity.email.as_str()]),
        cmd(&["git", "config", "user.name", identity.name.as_str()]),
        cmd(&["git", "add", "-A"]),
        cmd(&["git", "commit", "-q", "-m", identity.message.as_str()]),
    ]
}

/// A running, fully assembled environment
pub struct AssembledEnvironment<'a> {
    runtime: &'a dyn ContainerRuntime,
    container_id: String,
    workdir: Option<String>,
    seed: Option<SeedOutcome>,
}

impl std::fmt::Debug for AssembledEnvironment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssembledEnvironment")
            .field("container_id", &self.container_id)
            .field("workdir", &self.workdir)
            .field("seed", &self.seed)
            .finish()
    }
}

impl AssembledEnvironment<'_> {
    /// Run a command in the workdir and return its stdout
    pub async fn exec(&self, command: &[String]) -> FlakeboxResult<String> {
        self.runtime
            .exec(&self.container_id, self.workdir.as_deref(), command)
            .await
    }

    /// Container backing this environment
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Working directory commands run in
    pub fn workdir(&self) -> Option<&str> {
        self.workdir.as_deref()
    }

    /// Whether the cache was seeded or reused, if one was mounted
    pub fn seed_outcome(&self) -> Option<SeedOutcome> {
        self.seed
    }

    /// Remove the container
    pub async fn discard(self) -> FlakeboxResult<()> {
        debug!("Discarding environment {}", self.container_id);
        self.runtime.remove(&self.container_id).await
    }
}

/// Environment under construction
struct Pending {
    config: ContainerConfig,
    container_id: Option<String>,
    workdir: Option<String>,
    seed: Option<SeedOutcome>,
}

/// Assembles build environments against a container runtime
pub struct Assembler<'a> {
    runtime: &'a dyn ContainerRuntime,
    layout: EnvironmentLayout,
    snapshots: StoreSnapshotProvider,
    lock_dir: PathBuf,
    staging_dir: PathBuf,
}

impl<'a> Assembler<'a> {
    /// Create an assembler keeping locks and staged sources in the given dirs
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        layout: EnvironmentLayout,
        lock_dir: PathBuf,
        staging_dir: PathBuf,
    ) -> Self {
        let snapshots = StoreSnapshotProvider::new(&layout.base_image, &layout.store_path);
        Self {
            runtime,
            layout,
            snapshots,
            lock_dir,
            staging_dir,
        }
    }

    /// Create an assembler from configuration, using the state directories
    pub fn from_config(runtime: &'a dyn ContainerRuntime, config: &Config) -> Self {
        Self::new(
            runtime,
            EnvironmentLayout::from_config(config),
            ConfigManager::locks_dir(),
            ConfigManager::staging_dir(),
        )
    }

    /// Layout of the environments this assembler builds
    pub fn layout(&self) -> &EnvironmentLayout {
        &self.layout
    }

    /// Assemble an environment for `source`
    pub async fn assemble(&self, source: &SourceTree) -> FlakeboxResult<AssembledEnvironment<'a>> {
        info!("Assembling environment for {}", source.root().display());
        self.realize(&self.layout.spec_for(source)).await
    }

    /// Realize an arbitrary pipeline, step by step in order
    pub async fn realize(&self, spec: &EnvironmentSpec) -> FlakeboxResult<AssembledEnvironment<'a>> {
        spec.validate()?;
        self.check_base_image(spec)?;

        let mut pending = Pending {
            config: ContainerConfig::new(&self.layout.base_image, &self.layout.network),
            container_id: None,
            workdir: None,
            seed: None,
        };

        for step in spec.steps() {
            debug!("Applying {:?}", step.assembly_step());
            if let Err(e) = self.apply(&mut pending, step).await {
                self.abandon(&mut pending).await;
                return Err(match e {
                    FlakeboxError::Assembly { .. } => e,
                    other => other.at_step(step.assembly_step()),
                });
            }
        }

        let container_id = match pending.container_id.take() {
            Some(id) => id,
            None => self.start(&mut pending).await?,
        };

        Ok(AssembledEnvironment {
            runtime: self.runtime,
            container_id,
            workdir: pending.workdir,
            seed: pending.seed,
        })
    }

    /// The container and its store cache must both come from the image the
    /// snapshot provider seeds from
    fn check_base_image(&self, spec: &EnvironmentSpec) -> FlakeboxResult<()> {
        for step in spec.steps() {
            let image = match step {
                Step::From { image } => image,
                Step::MountedCache { volume, .. } => &volume.base_image,
                _ => continue,
            };
            if *image != self.layout.base_image {
                return Err(FlakeboxError::Pipeline(format!(
                    "{} step uses image {} but the store cache is seeded from {}",
                    step.name(),
                    image,
                    self.layout.base_image
                )));
            }
        }
        Ok(())
    }

    async fn apply(&self, pending: &mut Pending, step: &Step) -> FlakeboxResult<()> {
        match step {
            Step::From { image } => {
                if !self.runtime.image_exists(image).await? {
                    self.runtime.pull_image(image).await?;
                }
                pending.config.image = image.clone();
            }
            Step::EnvVariable { name, value } => {
                pending.config.env.insert(name.clone(), value.clone());
            }
            Step::MountedCache { path, volume } => {
                let outcome = volume
                    .ensure_seeded(self.runtime, &self.snapshots, &self.lock_dir)
                    .await?;
                debug!("Cache volume {}: {:?}", volume.name, outcome);
                pending.config.volumes.push(volume.volume_arg(path));
                pending.seed = Some(outcome);
            }
            Step::Directory { path, source } => {
                let id = self.ensure_started(pending).await?;
                let staged = source.stage(&self.staging_dir).await?;
                let copied = self.runtime.copy_into(&id, staged.path(), path).await;
                staged.cleanup().await;
                copied?;
            }
            Step::Workdir { path } => {
                if pending.container_id.is_none() {
                    pending.config.workdir = Some(path.clone());
                }
                pending.workdir = Some(path.clone());
            }
            Step::FreshRepository { identity } => {
                let id = self.ensure_started(pending).await?;
                for command in normalize_commands(identity) {
                    self.runtime
                        .exec(&id, pending.workdir.as_deref(), &command)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Start the container if it is not running yet
    async fn ensure_started(&self, pending: &mut Pending) -> FlakeboxResult<String> {
        if let Some(ref id) = pending.container_id {
            return Ok(id.clone());
        }
        let id = self.start(pending).await?;
        pending.container_id = Some(id.clone());
        Ok(id)
    }

    async fn start(&self, pending: &mut Pending) -> FlakeboxResult<String> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        pending.config.name = Some(format!("flakebox-env-{}", &suffix[..12]));

        let keepalive: Vec<String> = KEEPALIVE.iter().map(|s| s.to_string()).collect();
        self.runtime
            .run(&pending.config, &keepalive)
            .await
            .map_err(|e| e.at_step(AssemblyStep::Instantiate))
    }

    /// Remove a partially assembled container after a failure
    async fn abandon(&self, pending: &mut Pending) {
        if let Some(id) = pending.container_id.take() {
            if let Err(e) = self.runtime.remove(&id).await {
                warn!("Failed to remove partial environment {}: {}", id, e);
            }
        }
    }
}
