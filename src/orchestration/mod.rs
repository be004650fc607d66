//! Orchestration module for container runtimes
//!
//! Provides the execution backend the environment assembler runs against.
//! On Linux this is native rootless Podman.

mod factory;
#[cfg(test)]
pub(crate) mod fake;
mod native_podman;
pub mod podman;
mod runtime;

pub use factory::{create_runtime, Platform};
pub use native_podman::NativePodmanRuntime;
pub use podman::{ContainerConfig, DirectoryRef};
pub use runtime::{ContainerRuntime, VolumeInfo};

/// Max number of output lines to include in command error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of command output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn command_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > ERROR_TAIL_LINES {
        lines[total - ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_output_keeps_tail() {
        let stdout: String = (0..60).map(|i| format!("line {}\n", i)).collect();
        let out = command_error_output(&stdout, "error: boom");

        assert_eq!(out.lines().count(), ERROR_TAIL_LINES);
        assert!(out.ends_with("error: boom"));
        assert!(!out.contains("line 10\n"));
    }

    #[test]
    fn error_output_short() {
        assert_eq!(command_error_output("a", "b"), "a\nb");
    }
}
