//! Devshell verification
//!
//! Assembles an environment for a flake and enters its default development
//! shell, printing the ready marker followed by each configured tool's
//! version. Any failure, during assembly or inside the shell, is reported
//! as a failed devshell check.

use crate::config::schema::DevshellConfig;
use crate::environment::{Assembler, SourceTree};
use crate::error::{FlakeboxError, FlakeboxResult};
use tracing::{info, warn};

/// Quote `value` as a single POSIX shell word
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Script run inside the devshell: the marker, then every tool check
pub fn check_script(config: &DevshellConfig) -> String {
    std::iter::once(format!("echo {}", shell_quote(&config.ready_marker)))
        .chain(config.tools.iter().map(|tool| tool.command.clone()))
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Command entering the default devshell of the flake in the workdir
pub fn devshell_command(config: &DevshellConfig) -> Vec<String> {
    ["nix", "develop", "--command", "sh", "-c"]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(check_script(config)))
        .collect()
}

/// Assemble an environment for `source` and run the devshell check in it.
///
/// Returns the check's output. The environment is discarded either way.
pub async fn verify_devshell(
    assembler: &Assembler<'_>,
    source: &SourceTree,
    config: &DevshellConfig,
) -> FlakeboxResult<String> {
    let env = assembler
        .assemble(source)
        .await
        .map_err(FlakeboxError::devshell_check)?;

    info!("Entering devshell in {}", env.container_id());
    let result = env.exec(&devshell_command(config)).await;

    if let Err(e) = env.discard().await {
        warn!("Failed to discard environment: {}", e);
    }

    result.map_err(FlakeboxError::devshell_check)
}
