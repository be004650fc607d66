//! Command-line interface

mod args;
pub mod commands;

pub use args::{
    CacheAction, CacheArgs, CheckArgs, Cli, Commands, ConfigAction, ConfigArgs, LogFormat,
    OutputFormat,
};
