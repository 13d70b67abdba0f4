//! End-to-end coverage of the update daemon's interruption/rollback path
//! (`spec.md` §4.4, §8 invariant 6: "an update interrupted mid-flight
//! rolls back on the next startup").

use corvid_sentinel::update::{SnapshotStore, UpdateContext};
use corvid_sentinel::{UpdatePhase, UpdateState};
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Runs `git` in `dir`, panicking (test setup, not the thing under test)
/// if the command fails.
fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .expect("git must be on PATH for this test");
    assert!(status.success(), "git {args:?} failed in {dir:?}");
}

fn current_commit(dir: &Path) -> String {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["rev-parse", "HEAD"])
        .output()
        .unwrap();
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// E4: a process that died mid-`UpdatingCode` (code checked out, schema
/// migration not yet run) rolls back the DB/config snapshot and clears
/// `update_state.json` on the next startup, rather than serving requests
/// against a half-migrated install.
#[tokio::test]
async fn interrupted_updating_code_phase_rolls_back_on_recovery() {
    let data_dir = tempdir().unwrap();
    let repo_dir = tempdir().unwrap();

    git(repo_dir.path(), &["init"]);
    std::fs::write(repo_dir.path().join("README.md"), "before\n").unwrap();
    git(repo_dir.path(), &["add", "."]);
    git(repo_dir.path(), &["commit", "-m", "initial"]);
    let commit_id = current_commit(repo_dir.path());

    let db_path = data_dir.path().join("corvid.db");
    let config_path = data_dir.path().join("config.yaml");
    std::fs::write(&db_path, b"before-update sqlite bytes").unwrap();
    std::fs::write(&config_path, b"config_version: 1\n").unwrap();

    let snapshots = SnapshotStore::new(data_dir.path());
    let point = snapshots.capture(&commit_id, &db_path, &config_path).unwrap();

    // Simulate the interrupted apply: code/config/db already mutated in
    // place, state file still shows `updating_code`, never reached `idle`.
    std::fs::write(&db_path, b"partially-migrated bytes").unwrap();
    std::fs::write(&config_path, b"config_version: 2\n").unwrap();

    let mut state = UpdateState::new("v2.0.0");
    state.phase = UpdatePhase::UpdatingCode;
    state.rollback_point = Some(point);
    let state_path = data_dir.path().join("update_state.json");
    std::fs::write(&state_path, serde_json::to_vec_pretty(&state).unwrap()).unwrap();

    let context = UpdateContext {
        data_dir: data_dir.path().to_path_buf(),
        repo_dir: repo_dir.path().to_path_buf(),
        db_path: db_path.clone(),
        config_path: config_path.clone(),
        git_remote: "origin".to_string(),
        git_branch: "main".to_string(),
    };

    context.recover_on_startup().await.unwrap();

    assert_eq!(std::fs::read(&db_path).unwrap(), b"before-update sqlite bytes");
    assert_eq!(std::fs::read(&config_path).unwrap(), b"config_version: 1\n");
    assert!(!state_path.exists(), "update_state.json should be cleared after a completed rollback");
    assert_eq!(current_commit(repo_dir.path()), commit_id);
}

/// A state file left in a terminal (`idle`) phase is just stale leftover
/// from a clean shutdown; recovery clears it without touching the DB or
/// attempting a rollback.
#[tokio::test]
async fn idle_state_file_is_cleared_without_rollback() {
    let data_dir = tempdir().unwrap();
    let repo_dir = tempdir().unwrap();
    git(repo_dir.path(), &["init"]);
    std::fs::write(repo_dir.path().join("README.md"), "x\n").unwrap();
    git(repo_dir.path(), &["add", "."]);
    git(repo_dir.path(), &["commit", "-m", "initial"]);

    let db_path = data_dir.path().join("corvid.db");
    let config_path = data_dir.path().join("config.yaml");
    std::fs::write(&db_path, b"steady-state bytes").unwrap();
    std::fs::write(&config_path, b"config_version: 2\n").unwrap();

    let mut state = UpdateState::new("v2.0.0");
    state.phase = UpdatePhase::Idle;
    let state_path = data_dir.path().join("update_state.json");
    std::fs::write(&state_path, serde_json::to_vec_pretty(&state).unwrap()).unwrap();

    let context = UpdateContext {
        data_dir: data_dir.path().to_path_buf(),
        repo_dir: repo_dir.path().to_path_buf(),
        db_path: db_path.clone(),
        config_path: config_path.clone(),
        git_remote: "origin".to_string(),
        git_branch: "main".to_string(),
    };

    context.recover_on_startup().await.unwrap();

    assert!(!state_path.exists());
    assert_eq!(std::fs::read(&db_path).unwrap(), b"steady-state bytes");
}
