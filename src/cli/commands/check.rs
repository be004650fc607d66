//! Check command - assemble an environment and verify its devshell

use crate::cli::args::CheckArgs;
use crate::config::{Config, ConfigManager};
use crate::devshell::verify_devshell;
use crate::environment::{Assembler, SourceTree};
use crate::error::{FlakeboxError, FlakeboxResult};
use crate::orchestration::create_runtime;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Execute the check command
pub async fn execute(args: CheckArgs, config: &Config) -> FlakeboxResult<()> {
    let source_dir = resolve_source_dir(args.source)?;
    let source = SourceTree::new(&source_dir)?.with_excludes(config.source.exclude.iter().cloned());
    debug!("Source tree: {}", source.root().display());

    let pb = create_progress_bar("Checking podman...");

    let runtime = create_runtime()?;
    debug!("Using runtime: {}", runtime.runtime_name());
    runtime.ensure_ready().await?;
    ConfigManager::ensure_state_dirs().await?;

    pb.set_message(format!("Assembling environment from {}...", config.image.base));
    let assembler = Assembler::from_config(&*runtime, config);
    let result = verify_devshell(&assembler, &source, &config.devshell).await;
    pb.finish_and_clear();

    let output = result?;
    print!("{}", output);
    eprintln!("{} devshell check passed", style("✓").green());

    Ok(())
}

fn resolve_source_dir(source: Option<PathBuf>) -> FlakeboxResult<PathBuf> {
    match source {
        Some(dir) => Ok(dir),
        None => env::current_dir().map_err(|e| FlakeboxError::io("getting current directory", e)),
    }
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
