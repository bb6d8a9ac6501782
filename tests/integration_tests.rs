//! Integration tests for the `wave` binary.
//!
//! Every test works inside its own temporary project directory; waves run
//! with `--dry-run` so no agent programs are needed.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const WAVE_ENV: [&str; 4] = [
    "WAVE_LOG",
    "WAVE_DB_PATH",
    "WAVE_MAX_PHASE_RETRIES",
    "WAVE_AGENT_TIMEOUT_SECS",
];

/// Helper to create a wave Command rooted in a project directory
fn wave(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("wave");
    cmd.current_dir(dir);
    for key in WAVE_ENV {
        cmd.env_remove(key);
    }
    cmd
}

/// Temporary project with a small `src/` tree
fn create_temp_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src");
    fs::create_dir_all(src.join("api")).unwrap();
    fs::write(src.join("api/handler.rs"), "fn handler() {}\n").unwrap();
    fs::write(src.join("api/auth.rs"), "fn login() {}\n").unwrap();
    fs::write(src.join("lib.rs"), "mod api;\n").unwrap();
    dir
}

fn dry_run(dir: &Path, wave_id: &str, strategy: &str) -> assert_cmd::assert::Assert {
    wave(dir)
        .args([
            "run",
            "src",
            "--dry-run",
            "--strategy",
            strategy,
            "--wave-id",
            wave_id,
        ])
        .assert()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_wave_help() {
        let dir = create_temp_project();
        wave(dir.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("analyze"))
            .stdout(predicate::str::contains("rollback"));
    }

    #[test]
    fn test_wave_version() {
        let dir = create_temp_project();
        wave(dir.path()).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_command_fails() {
        let dir = create_temp_project();
        wave(dir.path()).arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Analyze
// =============================================================================

mod analyze {
    use super::*;

    #[test]
    fn test_analyze_prints_strategy() {
        let dir = create_temp_project();
        wave(dir.path())
            .args(["analyze", "src"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Complexity Analysis"))
            .stdout(predicate::str::contains("progressive"));
    }

    #[test]
    fn test_analyze_json_reports_signal() {
        let dir = create_temp_project();
        let output = wave(dir.path())
            .args(["--json", "analyze", "src", "--describe", "add auth endpoint"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["signal"]["file_count"], 3);
        assert_eq!(value["strategy"], "progressive");
        let domains = value["signal"]["domains"].as_array().unwrap();
        assert!(domains.iter().any(|d| d == "security"));
    }

    #[test]
    fn test_analyze_missing_target_fails() {
        let dir = create_temp_project();
        wave(dir.path())
            .args(["analyze", "does-not-exist"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not exist"));
    }
}

// =============================================================================
// Run and inspect
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_dry_run_completes_and_persists() {
        let dir = create_temp_project();
        dry_run(dir.path(), "w-dry", "systematic")
            .success()
            .stdout(predicate::str::contains("completed"));

        assert!(dir.path().join(".wave/waves.db").exists());

        wave(dir.path())
            .args(["status", "w-dry"])
            .assert()
            .success()
            .stdout(predicate::str::contains("systematic"))
            .stdout(predicate::str::contains("optimization.1"));
    }

    #[test]
    fn test_dry_run_json_outcome() {
        let dir = create_temp_project();
        let output = wave(dir.path())
            .args([
                "--json",
                "run",
                "src",
                "--dry-run",
                "--strategy",
                "systematic",
                "--wave-id",
                "w-json",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());

        let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(outcome["status"], "completed");
        assert_eq!(outcome["phases_completed"].as_array().unwrap().len(), 5);
        assert_eq!(outcome["final_checkpoint"], 4);
        assert!(outcome["faults"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_checkpoints_and_rollback() {
        let dir = create_temp_project();
        dry_run(dir.path(), "w-cp", "systematic").success();

        let output = wave(dir.path())
            .args(["--json", "checkpoints", "w-cp"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let checkpoints: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let checkpoints = checkpoints.as_array().unwrap();
        assert_eq!(checkpoints.len(), 5);
        assert_eq!(checkpoints[0]["sequence_number"], 0);
        assert_eq!(checkpoints[4]["phase"], "optimization");

        wave(dir.path())
            .args(["rollback", "w-cp"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Rollback target"))
            .stdout(predicate::str::contains("review.1"));
    }

    #[test]
    fn test_reused_wave_id_is_rejected() {
        let dir = create_temp_project();
        dry_run(dir.path(), "w-dup", "systematic").success();
        dry_run(dir.path(), "w-dup", "systematic")
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_invalid_strategy_fails() {
        let dir = create_temp_project();
        dry_run(dir.path(), "w-bad", "heroic")
            .failure()
            .stderr(predicate::str::contains("Invalid strategy"));
    }

    #[test]
    fn test_run_without_agents_fails_wave() {
        let dir = create_temp_project();
        wave(dir.path())
            .args(["run", "src", "--strategy", "systematic", "--wave-id", "w-none"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no agents configured"))
            .stderr(predicate::str::contains("finished failed"));
    }

    #[test]
    fn test_list_reports_stored_waves() {
        let dir = create_temp_project();
        dry_run(dir.path(), "w-first", "systematic").success();
        dry_run(dir.path(), "w-second", "progressive").success();

        let output = wave(dir.path()).args(["--json", "list"]).output().unwrap();
        assert!(output.status.success());
        let waves: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let waves = waves.as_array().unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0]["wave_id"], "w-first");
        assert_eq!(waves[1]["strategy"], "progressive");
        assert_eq!(waves[1]["status"], "completed");
        assert_eq!(waves[0]["file_count"], 3);
        assert!(waves[0]["complexity_score"].as_f64().unwrap() > 0.0);
        assert!(waves[0]["duration_ms"].as_i64().unwrap() >= 0);

        wave(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("DURATION"))
            .stdout(predicate::str::contains("w-second"));

        wave(dir.path())
            .args(["status", "w-first"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Duration:"));
    }

    #[test]
    fn test_status_unknown_wave() {
        let dir = create_temp_project();
        dry_run(dir.path(), "w-known", "systematic").success();
        wave(dir.path())
            .args(["status", "w-unknown"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_status_without_database() {
        let dir = create_temp_project();
        wave(dir.path())
            .args(["status", "anything"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No wave database"));
    }
}

// =============================================================================
// Config
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();
        wave(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No wave.toml found"))
            .stdout(predicate::str::contains("max_phase_retries = 2"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".wave")).unwrap();
        fs::write(
            dir.path().join(".wave/wave.toml"),
            "[orchestrator]\nadaptive_low_water = 2.0\n",
        )
        .unwrap();

        wave(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"));
    }

    #[test]
    fn test_config_validate_clean() {
        let dir = create_temp_project();
        wave(dir.path())
            .args(["--json", "config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"valid\": true"));
    }

    #[test]
    fn test_project_dir_flag() {
        let dir = create_temp_project();
        let elsewhere = TempDir::new().unwrap();
        wave(elsewhere.path())
            .args(["--project-dir"])
            .arg(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains(".wave"));
    }
}
