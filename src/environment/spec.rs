//! Environment pipeline
//!
//! An `EnvironmentSpec` is an immutable description of an environment,
//! built by chaining transformations that each consume the previous value
//! and return the next. Realizing it runs the steps in the recorded order,
//! and `validate` rejects any order the assembler cannot honor.

use crate::cache::CacheVolume;
use crate::environment::source::SourceTree;
use crate::error::{AssemblyStep, FlakeboxError, FlakeboxResult};

/// Identity and message used for the synthetic commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// One transformation of the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Start from a base image
    From { image: String },
    /// Set an environment variable on the container
    EnvVariable { name: String, value: String },
    /// Mount a persistent cache volume, seeding it on first use
    MountedCache { path: String, volume: CacheVolume },
    /// Copy a source tree to `path`
    Directory { path: String, source: SourceTree },
    /// Set the working directory for later commands
    Workdir { path: String },
    /// Replace any history at the workdir with a single fresh commit
    FreshRepository { identity: CommitIdentity },
}

impl Step {
    /// The assembly step failures of this transformation are reported under
    pub fn assembly_step(&self) -> AssemblyStep {
        match self {
            Self::From { .. } => AssemblyStep::Instantiate,
            Self::EnvVariable { .. } | Self::Workdir { .. } => AssemblyStep::Configure,
            Self::MountedCache { .. } => AssemblyStep::MountCache,
            Self::Directory { .. } => AssemblyStep::CopySource,
            Self::FreshRepository { .. } => AssemblyStep::NormalizeRepository,
        }
    }

    /// Position class; steps must appear in non-decreasing rank
    fn rank(&self) -> u8 {
        match self {
            Self::From { .. } => 0,
            Self::EnvVariable { .. } => 1,
            Self::MountedCache { .. } => 2,
            Self::Directory { .. } | Self::Workdir { .. } => 3,
            Self::FreshRepository { .. } => 4,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::From { .. } => "from",
            Self::EnvVariable { .. } => "env variable",
            Self::MountedCache { .. } => "mounted cache",
            Self::Directory { .. } => "directory",
            Self::Workdir { .. } => "workdir",
            Self::FreshRepository { .. } => "fresh repository",
        }
    }
}

/// Ordered description of an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    steps: Vec<Step>,
}

impl EnvironmentSpec {
    /// Start a pipeline from `image`
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            steps: vec![Step::From {
                image: image.into(),
            }],
        }
    }

    /// Start from an explicit list of steps (validated before realizing)
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_env_variable(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.then(Step::EnvVariable {
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn with_mounted_cache(self, path: impl Into<String>, volume: CacheVolume) -> Self {
        self.then(Step::MountedCache {
            path: path.into(),
            volume,
        })
    }

    pub fn with_directory(self, path: impl Into<String>, source: SourceTree) -> Self {
        self.then(Step::Directory {
            path: path.into(),
            source,
        })
    }

    pub fn with_workdir(self, path: impl Into<String>) -> Self {
        self.then(Step::Workdir { path: path.into() })
    }

    pub fn with_fresh_repository(self, identity: CommitIdentity) -> Self {
        self.then(Step::FreshRepository { identity })
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check the steps are in an order the assembler can realize.
    ///
    /// - exactly one `From`, and it comes first
    /// - environment variables, then cache mounts, then directories and
    ///   workdir, then repository normalization
    /// - normalization runs in a workdir a directory was copied to
    pub fn validate(&self) -> FlakeboxResult<()> {
        match self.steps.first() {
            Some(Step::From { .. }) => {}
            _ => return Err(FlakeboxError::Pipeline("must start from a base image".into())),
        }

        let mut directories: Vec<&str> = Vec::new();
        let mut workdir: Option<&str> = None;

        for (prev, step) in self.steps.iter().zip(self.steps.iter().skip(1)) {
            if matches!(step, Step::From { .. }) {
                return Err(FlakeboxError::Pipeline("more than one base image".into()));
            }
            if step.rank() < prev.rank() {
                return Err(FlakeboxError::Pipeline(format!(
                    "{} step cannot follow {} step",
                    step.name(),
                    prev.name()
                )));
            }
            match step {
                Step::Directory { path, .. } => directories.push(path),
                Step::Workdir { path } => workdir = Some(path.as_str()),
                Step::FreshRepository { .. } => {
                    let dir = workdir.ok_or_else(|| {
                        FlakeboxError::Pipeline("fresh repository needs a workdir".into())
                    })?;
                    if !directories.contains(&dir) {
                        return Err(FlakeboxError::Pipeline(format!(
                            "fresh repository at {} before any source was copied there",
                            dir
                        )));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}
