//! Persistent Nix store cache
//!
//! One named volume holds `/nix` (store paths plus the Nix database) across
//! independent runs. It is seeded once from the base image and afterwards
//! only the package manager writes to it, so store and database never drift
//! apart.
//!
//! # Cache States
//!
//! | State | Meaning | Next |
//! |-------|---------|------|
//! | Absent | No volume exists | create, then seed |
//! | Seeding | Volume exists, seed marker missing | seed |
//! | Ready | Seed marker present | reuse untouched |

pub mod lock;
pub mod snapshot;
pub mod volume;

pub use lock::VolumeLock;
pub use snapshot::{StoreSnapshot, StoreSnapshotProvider};
pub use volume::{labels, volume_name, CacheState, CacheVolume, SeedOutcome, SEED_MARKER};
