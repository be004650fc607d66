//! Integration tests for flakebox

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn flakebox() -> Command {
        let mut cmd = cargo_bin_cmd!("flakebox");
        cmd.env_remove("FLAKEBOX_CONFIG");
        cmd
    }

    #[test]
    fn help_displays() {
        flakebox()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nix flake build environments"));
    }

    #[test]
    fn version_displays() {
        flakebox()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("flakebox"));
    }

    #[test]
    fn config_path() {
        flakebox()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_path_honors_flag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");

        flakebox()
            .args(["--config", path.to_str().unwrap(), "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show() {
        flakebox()
            .args(["--no-local", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[image]"))
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_show_merges_local_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".flakebox.toml"),
            "[cache]\nvolume = \"stereos-nix\"\n",
        )
        .unwrap();

        flakebox()
            .current_dir(temp.path())
            .args(["--config", temp.path().join("none.toml").to_str().unwrap()])
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stereos-nix"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[container]\nworkdir = \"workspace\"\n").unwrap();

        flakebox()
            .args(["--no-local", "--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("container.workdir"));
    }

    #[test]
    fn check_help() {
        flakebox()
            .args(["check", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--source"));
    }

    #[test]
    fn check_missing_source() {
        flakebox()
            .args(["--no-local", "check", "--source", "/definitely/not/a/flake"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Source tree not found"));
    }

    #[test]
    fn cache_status_reports_volume_or_runtime_error() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");

        let output = flakebox()
            .args(["--no-local", "--config", config.to_str().unwrap()])
            .args(["cache", "status", "--format", "json"])
            .output()
            .unwrap();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();

        if output.status.success() {
            let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
            assert_eq!(report["volume"], "nix");
            assert!(["absent", "seeding", "ready"].contains(&report["state"].as_str().unwrap()));
        } else {
            assert_eq!(output.status.code(), Some(1));
            assert!(stderr.contains("error:"));
            assert!(
                stderr.contains("podman") || stderr.contains("platform"),
                "unexpected failure: {}",
                stderr
            );
        }
    }
}
