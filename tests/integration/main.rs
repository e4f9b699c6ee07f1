//! Integration tests for firmloop

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn firmloop() -> Command {
        cargo_bin_cmd!("firmloop")
    }

    fn with_config(path: &Path) -> Command {
        let mut cmd = firmloop();
        cmd.arg("--config").arg(path);
        cmd
    }

    #[test]
    fn help_displays() {
        firmloop()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("continuous firmware build"));
    }

    #[test]
    fn version_displays() {
        firmloop()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("firmloop"));
    }

    #[test]
    fn config_path() {
        firmloop()
            .args(["config", "path"])
            .env_remove("FIRMLOOP_CONFIG")
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_path_follows_flag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");

        with_config(&path)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();

        with_config(&temp.path().join("missing.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[workspace]"))
            .stdout(predicate::str::contains("retention_days = 7"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("firmloop").join("config.toml");

        with_config(&path)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(path.exists());

        with_config(&path)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[workspace\nroot = ").unwrap();

        with_config(&path)
            .args(["steps", "a", "b"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn location_mismatch_shows_hint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[devices]\nlist = [\"dev-a\", \"dev-b\"]\n\n[board]\nlocation_ids = [\"1\"]\n",
        )
        .unwrap();

        with_config(&path)
            .args(["newer"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("2 devices configured"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_only_requires_compile_commands() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[manager]\nkind = \"build_only\"\n").unwrap();

        with_config(&path)
            .args(["steps", "a", "b"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("build.pre_compile_cmd"));
    }

    #[test]
    fn command_tester_requires_tool() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[tester]\nkind = \"command\"\n").unwrap();

        with_config(&path)
            .args(["run", "dayu200_20230101_120000"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("tester.command.tool"));
    }

    #[test]
    fn unknown_device_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[devices]\nlist = [\"dev-a\"]\n").unwrap();

        with_config(&path)
            .args(["run", "dayu200_20230101_120000", "--device", "dev-z"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("dev-z"));
    }
}
