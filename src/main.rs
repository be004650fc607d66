//! flakebox - Nix flake build environments in rootless containers
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use flakebox::cli::{Cli, Commands, LogFormat};
use flakebox::config::ConfigManager;
use flakebox::error::{FlakeboxError, FlakeboxResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> FlakeboxResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("flakebox=warn"),
        1 => EnvFilter::new("flakebox=info"),
        _ => EnvFilter::new("flakebox=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match cli.log_format {
        LogFormat::Text => subscriber.without_time().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    // Load configuration
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        debug!("Local config discovery disabled (--no-local)");
        None
    } else {
        let start = discovery_root(&cli.command)?;
        let found = ConfigManager::find_local_config(&start);
        if let Some(ref path) = found {
            debug!("Found local config: {}", path.display());
        }
        found
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    // Dispatch to command
    match cli.command {
        Commands::Check(args) => flakebox::cli::commands::check(args, &config).await,
        Commands::Cache(args) => flakebox::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            flakebox::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// Directory local config discovery starts from: the flake being checked,
/// otherwise the current directory
fn discovery_root(command: &Commands) -> FlakeboxResult<PathBuf> {
    if let Commands::Check(args) = command {
        if let Some(ref source) = args.source {
            return Ok(source.clone());
        }
    }
    std::env::current_dir().map_err(|e| FlakeboxError::io("getting current directory", e))
}
