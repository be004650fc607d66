//! Cache volume state management
//!
//! A single named volume holds the Nix store and its database across runs.
//! It is created on first use, seeded once from the base image's store
//! snapshot, and reused as-is afterwards.

use crate::cache::lock::VolumeLock;
use crate::cache::snapshot::StoreSnapshotProvider;
use crate::error::{FlakeboxError, FlakeboxResult};
use crate::orchestration::ContainerRuntime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// File written at the volume root once seeding has completed
pub const SEED_MARKER: &str = ".flakebox-seeded";

/// Volume label keys used to track cache metadata
pub mod labels {
    /// Marks volume as a flakebox cache
    pub const FLAKEBOX_CACHE: &str = "io.flakebox.cache";
    /// Base image the volume was seeded from
    pub const BASE_IMAGE: &str = "io.flakebox.cache.base-image";
    /// Creation timestamp (RFC3339)
    pub const CREATED_AT: &str = "io.flakebox.cache.created-at";
}

/// State of a cache volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// No volume exists
    Absent,
    /// Volume exists but has not been (fully) seeded
    Seeding,
    /// Volume is seeded and owned by the package manager
    Ready,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Seeding => write!(f, "seeding"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// What happened to the volume while preparing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedOutcome {
    /// The volume was seeded from the store snapshot during this call
    Seeded,
    /// The volume already held a seeded store and was left untouched
    Reused,
}

/// Derive the volume name, optionally keyed by the base image.
///
/// A versioned name sends each base image to its own volume, so an image
/// upgrade starts from a fresh seed instead of reusing an older store.
pub fn volume_name(base: &str, base_image: &str, versioned: bool) -> String {
    if !versioned {
        return base.to_string();
    }
    let hash = hex::encode(Sha256::digest(base_image.as_bytes()));
    format!("{}-{}", base, &hash[..12])
}

/// A named cache volume mounted over the store path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVolume {
    /// Volume name
    pub name: String,
    /// Base image the volume is seeded from
    pub base_image: String,
}

impl CacheVolume {
    /// Create a new cache volume record
    pub fn new(name: impl Into<String>, base_image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_image: base_image.into(),
        }
    }

    /// Generate labels for volume creation
    pub fn labels(&self, created_at: DateTime<Utc>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(labels::FLAKEBOX_CACHE.to_string(), "true".to_string());
        labels.insert(labels::BASE_IMAGE.to_string(), self.base_image.clone());
        labels.insert(labels::CREATED_AT.to_string(), created_at.to_rfc3339());
        labels
    }

    /// Generate the volume mount string for podman
    pub fn volume_arg(&self, container_path: &str) -> String {
        format!("{}:{}", self.name, container_path)
    }

    /// Determine the current state of the volume
    pub async fn probe(&self, runtime: &dyn ContainerRuntime) -> FlakeboxResult<CacheState> {
        if runtime.volume_inspect(&self.name).await?.is_none() {
            return Ok(CacheState::Absent);
        }

        if runtime
            .volume_contains(&self.name, &self.base_image, SEED_MARKER)
            .await?
        {
            Ok(CacheState::Ready)
        } else {
            Ok(CacheState::Seeding)
        }
    }

    /// Make sure the volume exists and is seeded.
    ///
    /// Runs absent -> seeding -> ready under an exclusive per-volume lock.
    /// A volume found in `Seeding` was interrupted before any command ran
    /// against it, so it is seeded again from the start. A `Ready` volume is
    /// never touched.
    pub async fn ensure_seeded(
        &self,
        runtime: &dyn ContainerRuntime,
        snapshots: &StoreSnapshotProvider,
        lock_dir: &Path,
    ) -> FlakeboxResult<SeedOutcome> {
        let _lock = VolumeLock::acquire(lock_dir, &self.name).await?;

        let mut state = self.probe(runtime).await?;
        debug!("Cache volume {} is {}", self.name, state);

        loop {
            match state {
                CacheState::Absent => {
                    runtime
                        .volume_create(&self.name, &self.labels(Utc::now()))
                        .await
                        .map_err(|e| match e {
                            FlakeboxError::CacheVolumeCreate { .. } => e,
                            other => FlakeboxError::CacheVolumeCreate {
                                name: self.name.clone(),
                                reason: other.to_string(),
                            },
                        })?;
                    state = CacheState::Seeding;
                }
                CacheState::Seeding => {
                    let snapshot = snapshots.get(runtime).await?;
                    runtime
                        .seed_volume(&self.name, &snapshot.directory, SEED_MARKER)
                        .await?;
                    info!("Seeded cache volume {} from {}", self.name, snapshot.directory);
                    return Ok(SeedOutcome::Seeded);
                }
                CacheState::Ready => {
                    self.warn_if_stale(runtime).await?;
                    return Ok(SeedOutcome::Reused);
                }
            }
        }
    }

    /// Log when a reused volume was seeded from a different base image
    async fn warn_if_stale(&self, runtime: &dyn ContainerRuntime) -> FlakeboxResult<()> {
        let seeded_from = runtime
            .volume_inspect(&self.name)
            .await?
            .and_then(|info| info.labels.get(labels::BASE_IMAGE).cloned());

        if let Some(image) = seeded_from.filter(|image| *image != self.base_image) {
            warn!(
                "Cache volume {} was seeded from {} but the base image is now {}; \
                 set cache.versioned = true to key the cache by image",
                self.name, image, self.base_image
            );
        }
        Ok(())
    }
}
