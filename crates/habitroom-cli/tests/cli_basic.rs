//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a throwaway data directory and
//! verify its JSON output.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_habitroom-cli"))
        .env("HABITROOM_DATA_DIR", data_dir)
        .env_remove("HABITROOM_LOG")
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Run a CLI command, expect success and parse stdout as JSON.
fn run_json(data_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "CLI command failed: {args:?}\n{stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

fn create_habit(data_dir: &Path, extra: &[&str]) -> String {
    let mut args = vec!["--today", "2024-01-01", "habit", "create", "Read"];
    args.extend_from_slice(extra);
    let habit = run_json(data_dir, &args);
    habit["id"].as_str().unwrap().to_string()
}

#[test]
fn test_daily_marks_and_retroactive_fix() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_habit(dir.path(), &[]);

    for day in (1..=5).chain(7..=10) {
        let today = format!("2024-01-{day:02}");
        run_json(dir.path(), &["--today", &today, "mark", &id]);
    }
    let streak = run_json(dir.path(), &["--today", "2024-01-10", "streak", "show", &id]);
    assert_eq!(streak["current_streak"], 4);
    assert_eq!(streak["longest_streak"], 5);

    let update = run_json(
        dir.path(),
        &["--today", "2024-01-10", "retro", &id, "--date", "2024-01-06"],
    );
    assert_eq!(update["streak"]["current_streak"], 10);
    assert_eq!(update["audit_entry"]["kind"], "retroactive-mark");

    let audit = run_json(dir.path(), &["audit", &id]);
    assert_eq!(audit.as_array().unwrap().len(), 10);
}

#[test]
fn test_mark_note_is_written_with_the_mark() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_habit(dir.path(), &[]);

    let update = run_json(
        dir.path(),
        &["--today", "2024-01-01", "mark", &id, "--note", "first page"],
    );
    assert_eq!(update["record"]["notes"], "first page");
    assert_eq!(update["streak"]["current_streak"], 1);

    // A rejected mark must not leave a note-only record behind.
    let (_, _, code) = run_cli(
        dir.path(),
        &["--today", "2024-01-01", "mark", &id, "--date", "2024-01-02", "--note", "early"],
    );
    assert_eq!(code, 1);
    let page = run_json(dir.path(), &["history", &id]);
    assert_eq!(page["records"].as_array().unwrap().len(), 1);
    assert_eq!(run_json(dir.path(), &["audit", &id]).as_array().unwrap().len(), 1);
}

#[test]
fn test_numeric_progress_accepts_negative_deltas() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_habit(dir.path(), &["--type", "numeric", "--target", "10000"]);

    run_json(dir.path(), &["--today", "2024-01-01", "progress", &id, "3000"]);
    let update = run_json(dir.path(), &["--today", "2024-01-01", "progress", &id, "-1000"]);
    assert_eq!(update["record"]["value"], 2000);
    assert_eq!(update["record"]["completed"], false);
}

#[test]
fn test_rejections_exit_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_habit(dir.path(), &["--every", "weekly", "--days", "mon,wed,fri"]);

    // 2024-01-02 is a Tuesday.
    let (_, stderr, code) = run_cli(dir.path(), &["--today", "2024-01-02", "mark", &id]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not an obligated day"), "{stderr}");

    let (_, stderr, code) = run_cli(dir.path(), &["streak", "show", "missing"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not found"), "{stderr}");
}

#[test]
fn test_history_pages() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_habit(dir.path(), &[]);
    for day in 1..=5 {
        let date = format!("2024-01-{day:02}");
        run_json(dir.path(), &["--today", "2024-01-05", "retro", &id, "--date", &date]);
    }

    let page = run_json(dir.path(), &["history", &id, "--limit", "2"]);
    assert_eq!(page["records"].as_array().unwrap().len(), 2);
    assert_eq!(page["next_cursor"], "2024-01-04");

    let rest = run_json(dir.path(), &["history", &id, "--cursor", "2024-01-04", "--all"]);
    assert_eq!(rest.as_array().unwrap().len(), 3);
}

#[test]
fn test_config_set_and_get() {
    let dir = tempfile::tempdir().unwrap();

    let (stdout, _, code) = run_cli(dir.path(), &["config", "set", "schedule.monthly_overflow", "skip"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "schedule.monthly_overflow"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "skip");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "history.nope", "1"]);
    assert_eq!(code, 1);
}
