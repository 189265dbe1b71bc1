//! End-to-end tests driving the `tt` binary against a throwaway
//! database. Stdout is piped, so every command answers in JSON.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn tt(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tt").unwrap();
    cmd.arg("--db").arg(db);
    cmd.env_remove("TT_DB");
    cmd.env_remove("TT_TEST_DB");
    cmd.env_remove("TT_ACTOR");
    cmd
}

fn init_db(dir: &TempDir) -> PathBuf {
    let db = dir.path().join("tasktrail.db");
    tt(&db).arg("init").assert().success();
    db
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    let db = init_db(&dir);
    assert!(db.exists());

    let output = tt(&db).arg("init").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ALREADY_INITIALIZED"), "stderr: {stderr}");

    tt(&db).args(["init", "--force"]).assert().success();
}

#[test]
fn commands_fail_before_init() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("missing.db");

    let output = tt(&db).args(["project", "list"]).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("NOT_INITIALIZED"), "stderr: {stderr}");
}

#[test]
fn task_lifecycle_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = init_db(&dir);

    let project = stdout_json(tt(&db).args(["project", "add", "--title", "Website"]));
    assert_eq!(project["project_id"], 1);

    let user = stdout_json(tt(&db).args([
        "user",
        "add",
        "alice",
        "--pass",
        "hunter2",
        "--real-name",
        "Alice",
    ]));
    assert_eq!(user["user_id"], 1);

    for cap in ["view_tasks", "open_task", "close_task", "add_comments"] {
        tt(&db)
            .args(["grant", "1", cap, "--project", "1"])
            .assert()
            .success();
    }

    let opened = stdout_json(tt(&db).args([
        "--actor",
        "1",
        "task",
        "open",
        "--project",
        "1",
        "--summary",
        "Fix login redirect",
        "--desc",
        "302 loops back to the form",
        "--severity",
        "4",
    ]));
    assert_eq!(opened["task_id"], 1);

    let commented = stdout_json(tt(&db).args([
        "--actor",
        "1",
        "comment",
        "1",
        "Reproduced on staging",
    ]));
    assert_eq!(commented["task_id"], 1);

    let page = stdout_json(tt(&db).args(["--actor", "1", "list", "--project", "1"]));
    assert_eq!(page["total"], 1);
    assert_eq!(page["all_ids"], serde_json::json!([1]));
    assert_eq!(page["tasks"][0]["item_summary"], "Fix login redirect");

    let closed = stdout_json(tt(&db).args([
        "--actor",
        "1",
        "task",
        "close",
        "1",
        "--reason",
        "8",
        "--comment",
        "fixed in trunk",
    ]));
    assert_eq!(closed["closed"], true);

    // Closed tasks drop out of an open-only listing.
    let open_only = stdout_json(tt(&db).args([
        "--actor", "1", "list", "--project", "1", "--status", "open",
    ]));
    assert_eq!(open_only["total"], 0);

    let history = stdout_json(tt(&db).args(["history", "1"]));
    let kinds: Vec<&str> = history["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"opened"), "events: {kinds:?}");
    assert!(kinds.contains(&"comment_added"), "events: {kinds:?}");
    assert!(kinds.contains(&"closed"), "events: {kinds:?}");
}

#[test]
fn permission_denied_open_is_an_error_not_a_task() {
    let dir = TempDir::new().unwrap();
    let db = init_db(&dir);

    tt(&db)
        .args(["project", "add", "--title", "Website"])
        .assert()
        .success();

    // No open_task grant for user 5.
    let output = tt(&db)
        .args([
            "--actor", "5", "task", "open", "--project", "1", "--summary", "s", "--desc", "d",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let page = stdout_json(tt(&db).args(["grant", "0", "view_tasks"]));
    assert_eq!(page["changed"], true);
    let listed = stdout_json(tt(&db).arg("list"));
    assert_eq!(listed["total"], 0);
}

#[test]
fn unknown_capability_gets_a_suggestion() {
    let dir = TempDir::new().unwrap();
    let db = init_db(&dir);

    let output = tt(&db).args(["grant", "1", "vew_tasks"]).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("view_tasks"), "stderr: {stderr}");
}

#[test]
fn watch_and_unwatch_report_outcomes() {
    let dir = TempDir::new().unwrap();
    let db = init_db(&dir);

    tt(&db)
        .args(["project", "add", "--title", "Website"])
        .assert()
        .success();
    for cap in ["view_tasks", "open_task"] {
        tt(&db)
            .args(["grant", "1", cap, "--project", "1"])
            .assert()
            .success();
    }
    tt(&db)
        .args([
            "--actor", "1", "task", "open", "--project", "1", "--summary", "s", "--desc", "d",
        ])
        .assert()
        .success();

    let watched = stdout_json(tt(&db).args(["--actor", "1", "watch", "1"]));
    assert_eq!(watched["changed"], 1);

    let again = stdout_json(tt(&db).args(["--actor", "1", "watch", "1"]));
    assert_eq!(again["changed"], 0);

    let unwatched = stdout_json(tt(&db).args(["--actor", "1", "unwatch", "1"]));
    assert_eq!(unwatched["changed"], 1);
}

#[test]
fn due_date_covers_the_whole_day() {
    let dir = TempDir::new().unwrap();
    let db = init_db(&dir);

    tt(&db)
        .args(["project", "add", "--title", "Website"])
        .assert()
        .success();
    for cap in ["view_tasks", "open_task", "modify_all_tasks"] {
        tt(&db)
            .args(["grant", "1", cap, "--project", "1"])
            .assert()
            .success();
    }
    tt(&db)
        .args([
            "--actor", "1", "task", "open", "--project", "1", "--summary", "s", "--desc", "d",
            "--due", "2024-03-01",
        ])
        .assert()
        .success();

    // A task due March 1st is still due anywhere within that day, so an
    // inclusive "to" bound on the same date must match it.
    let same_day = stdout_json(tt(&db).args([
        "--actor", "1", "list", "--due-to", "2024-03-01",
    ]));
    assert_eq!(same_day["total"], 1);

    let day_before = stdout_json(tt(&db).args([
        "--actor", "1", "list", "--due-to", "2024-02-29",
    ]));
    assert_eq!(day_before["total"], 0);

    let day_of = stdout_json(tt(&db).args([
        "--actor", "1", "list", "--due-from", "2024-03-01",
    ]));
    assert_eq!(day_of["total"], 1);
}

#[test]
fn version_reports_the_crate_version() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("unused.db");

    let version = stdout_json(tt(&db).arg("version"));
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
}
