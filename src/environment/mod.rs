//! Build environment assembly
//!
//! An environment is described as an ordered pipeline (`EnvironmentSpec`)
//! and realized against a container runtime by the `Assembler`:
//!
//! | Step | Effect |
//! |------|--------|
//! | from | base image providing Nix |
//! | env variable | `NIX_CONFIG` enabling flakes |
//! | mounted cache | seeded store volume over `/nix` |
//! | directory | filtered copy of the source tree |
//! | workdir | where later commands run |
//! | fresh repository | one synthetic commit replacing host history |

mod assemble;
pub mod source;
pub mod spec;

pub use assemble::{normalize_commands, AssembledEnvironment, Assembler, EnvironmentLayout};
pub use source::{SourceTree, StagedSource, DEFAULT_EXCLUDES};
pub use spec::{CommitIdentity, EnvironmentSpec, Step};
