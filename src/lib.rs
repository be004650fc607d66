//! flakebox - Nix flake build environments in rootless containers
//!
//! Assembles a build environment from a Nix base image, a persistent store
//! cache volume and a copy of the flake source, then verifies the flake's
//! development shell inside it.

pub mod cache;
pub mod cli;
pub mod config;
pub mod devshell;
pub mod environment;
pub mod error;
pub mod orchestration;

pub use error::{FlakeboxError, FlakeboxResult};
