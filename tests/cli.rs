//! CLI smoke tests for the foundry binary.
//!
//! None of these start an agent process.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn foundry() -> Command {
    cargo_bin_cmd!("foundry")
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_foundry_help() {
        foundry()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("resume"))
            .stdout(predicate::str::contains("skills"));
    }

    #[test]
    fn test_foundry_version() {
        foundry()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("foundry"));
    }

    #[test]
    fn test_run_requires_a_problem() {
        let dir = create_temp_project();
        foundry()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure();
    }
}

mod runs {
    use super::*;

    #[test]
    fn test_list_with_no_runs() {
        let dir = create_temp_project();
        foundry()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No runs found"));
    }

    #[test]
    fn test_status_of_missing_run_fails() {
        let dir = create_temp_project();
        foundry()
            .current_dir(dir.path())
            .args(["status", "Todo App"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_delete_of_missing_run_fails() {
        let dir = create_temp_project();
        foundry()
            .current_dir(dir.path())
            .args(["delete", "Todo App", "--force"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_list_and_status_read_stored_snapshot() {
        let dir = create_temp_project();
        let run_dir = dir.path().join(".foundry/runs/todo-app");
        fs::create_dir_all(&run_dir).unwrap();
        fs::write(
            run_dir.join("pipeline_state.json"),
            r#"{
                "schema_version": 1,
                "title": "Todo App",
                "slug": "todo-app",
                "problem": "build a todo app",
                "mode": {"stage": "spec"},
                "created_at": "2026-01-01T00:00:00Z",
                "updated_at": "2026-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();

        foundry()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("todo-app"));

        foundry()
            .current_dir(dir.path())
            .args(["status", "Todo App"])
            .assert()
            .success()
            .stdout(predicate::str::contains("build a todo app"));

        foundry()
            .current_dir(dir.path())
            .args(["delete", "todo app", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Deleted run 'todo-app'"));
        assert!(!run_dir.exists());
    }

    #[test]
    fn test_output_dir_override() {
        let dir = create_temp_project();
        let out = dir.path().join("elsewhere");
        foundry()
            .current_dir(dir.path())
            .arg("--output-dir")
            .arg(&out)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("elsewhere"));
    }
}

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();
        foundry()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("min_confidence = 0.6"))
            .stdout(predicate::str::contains("foundry config init"));
    }

    #[test]
    fn test_config_init_then_validate() {
        let dir = create_temp_project();
        foundry()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created foundry.toml"));
        assert!(dir.path().join(".foundry/foundry.toml").exists());

        foundry()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));

        foundry()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        let foundry_dir = dir.path().join(".foundry");
        fs::create_dir_all(&foundry_dir).unwrap();
        fs::write(
            foundry_dir.join("foundry.toml"),
            "[gates]\nmin_confidence = 1.5\nescalation_token_budget = 0\n",
        )
        .unwrap();

        foundry()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("min_confidence"))
            .stdout(predicate::str::contains("escalation_token_budget"));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = create_temp_project();
        let foundry_dir = dir.path().join(".foundry");
        fs::create_dir_all(&foundry_dir).unwrap();
        fs::write(foundry_dir.join("foundry.toml"), "[gates\n").unwrap();

        foundry()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("foundry.toml"));
    }
}

mod skills {
    use super::*;

    #[test]
    fn test_skills_list_empty() {
        let dir = create_temp_project();
        foundry()
            .current_dir(dir.path())
            .args(["skills", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No skills learned yet"));
    }

    #[test]
    fn test_skills_show_from_bank() {
        let dir = create_temp_project();
        let bank_dir = dir.path().join(".foundry/skill_bank");
        fs::create_dir_all(&bank_dir).unwrap();
        fs::write(
            bank_dir.join("skills.json"),
            r#"{"skills": [{"id": "skill-db", "name": "Database migrations",
                "description": "Write reversible migrations", "tags": ["db"]}]}"#,
        )
        .unwrap();

        foundry()
            .current_dir(dir.path())
            .args(["skills", "show", "skill-db"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Write reversible migrations"));

        foundry()
            .current_dir(dir.path())
            .args(["skills", "show", "database"])
            .assert()
            .success()
            .stdout(predicate::str::contains("skill-db"));
    }
}
