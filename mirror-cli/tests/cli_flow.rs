use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn mirror(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mirror"));
    cmd.arg("--config-home").arg(home).env("RUST_LOG", "warn");
    cmd
}

fn git(dir: &Path, args: &[&str]) {
    let status = StdCommand::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

struct Repos {
    _dir: TempDir,
    source: PathBuf,
    work: PathBuf,
}

/// Archive with two files; work repo pushed to a bare remote on `main`.
fn repos() -> Repos {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source");
    let work = dir.path().join("work");
    let remote = dir.path().join("remote.git");

    fs::create_dir_all(source.join("docs")).unwrap();
    git(&source, &["init", "-q"]);
    git(&source, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    fs::write(source.join("index.md"), "# Archive\n").unwrap();
    fs::write(source.join("docs/guide.md"), "guide v1\n").unwrap();
    git(&source, &["add", "-A"]);
    git(&source, &["commit", "-q", "-m", "seed"]);

    git(dir.path(), &["init", "-q", "--bare", "remote.git"]);
    git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    fs::create_dir_all(&work).unwrap();
    git(&work, &["init", "-q"]);
    git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    fs::write(work.join("README.md"), "site\n").unwrap();
    git(&work, &["add", "-A"]);
    git(&work, &["commit", "-q", "-m", "initial"]);
    git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
    git(&work, &["push", "-q", "-u", "origin", "main"]);

    Repos {
        _dir: dir,
        source,
        work,
    }
}

fn add_profile(home: &Path, repos: &Repos) {
    mirror(home)
        .args(["profile", "add", "main", "--source"])
        .arg(format!("file://{}", repos.source.display()))
        .arg("--repo")
        .arg(&repos.work)
        .args(["--target", "archive", "--schedule", "03:30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added profile 'main'"));
}

#[test]
fn init_creates_config_once() {
    let home = TempDir::new().unwrap();

    mirror(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(home.path().join(".mirror/config.yaml").exists());

    mirror(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already present"));
}

#[test]
fn profile_add_list_remove() {
    let home = TempDir::new().unwrap();
    let repos = repos();

    mirror(home.path())
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No profiles configured."));

    add_profile(home.path(), &repos);

    mirror(home.path())
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("main").and(predicate::str::contains("03:30")));

    mirror(home.path())
        .args(["profile", "remove", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed profile 'main'"));

    mirror(home.path())
        .args(["profile", "remove", "main"])
        .assert()
        .failure();
}

#[test]
fn profile_add_rejects_bad_schedule() {
    let home = TempDir::new().unwrap();
    let repos = repos();

    mirror(home.path())
        .args(["profile", "add", "main", "--source", "file:///nowhere", "--repo"])
        .arg(&repos.work)
        .args(["--target", "archive", "--schedule", "25:99"])
        .assert()
        .failure();
}

#[test]
fn sync_updates_then_reports_no_changes() {
    let home = TempDir::new().unwrap();
    let repos = repos();
    add_profile(home.path(), &repos);

    mirror(home.path())
        .args(["sync", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("'main' updated"))
        .stdout(predicate::str::contains("+  docs/guide.md"));
    assert_eq!(
        fs::read_to_string(repos.work.join("archive/docs/guide.md")).unwrap(),
        "guide v1\n"
    );

    mirror(home.path())
        .args(["sync", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("'main' no changes"));
}

#[test]
fn dry_run_and_diff_leave_target_untouched() {
    let home = TempDir::new().unwrap();
    let repos = repos();
    add_profile(home.path(), &repos);

    mirror(home.path())
        .args(["sync", "--all", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry-run]"));
    assert!(!repos.work.join("archive").exists());

    mirror(home.path()).args(["sync", "main"]).assert().success();

    fs::write(repos.source.join("docs/guide.md"), "guide v2\n").unwrap();
    git(&repos.source, &["commit", "-q", "-am", "edit guide"]);

    mirror(home.path())
        .args(["diff", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-guide v1"))
        .stdout(predicate::str::contains("+guide v2"));
    assert_eq!(
        fs::read_to_string(repos.work.join("archive/docs/guide.md")).unwrap(),
        "guide v1\n"
    );
}

#[test]
fn sync_rejects_profile_and_all_together() {
    let home = TempDir::new().unwrap();
    mirror(home.path())
        .args(["sync", "main", "--all"])
        .assert()
        .failure();
}

#[test]
fn failed_sync_exits_non_zero_and_shows_failing_status() {
    let home = TempDir::new().unwrap();
    let repos = repos();
    mirror(home.path())
        .args(["profile", "add", "main", "--source"])
        .arg(format!("file://{}", repos.source.join("missing").display()))
        .arg("--repo")
        .arg(&repos.work)
        .args(["--target", "archive"])
        .assert()
        .success();

    mirror(home.path())
        .args(["sync", "main"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sync failed for 'main'"));

    let output = mirror(home.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["profiles"], 1);
    assert_eq!(json["profiles"][0]["status"], "failing");
    assert_eq!(json["profiles"][0]["last_outcome"], "failed");
}

#[test]
fn status_reports_current_after_sync() {
    let home = TempDir::new().unwrap();
    let repos = repos();
    add_profile(home.path(), &repos);

    let output = mirror(home.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["profiles"][0]["status"], "never_synced");

    mirror(home.path()).args(["sync", "main"]).assert().success();

    let output = mirror(home.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["profiles"][0]["status"], "current");
    assert_eq!(json["summary"]["needs_attention"], 0);
}

#[test]
fn inspect_reports_repository_state() {
    let home = TempDir::new().unwrap();
    let repos = repos();
    add_profile(home.path(), &repos);

    let output = mirror(home.path())
        .args(["inspect", "main", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["profile"], "main");
    assert_eq!(json["branch"], "main");
    assert_eq!(json["target_exists"], false);
    assert_eq!(json["freshness"], "never synced");

    mirror(home.path())
        .args(["inspect", "main"])
        .assert()
        .success()
        .stdout(predicate::str::contains("repository:"));
}

#[test]
fn unknown_profile_fails() {
    let home = TempDir::new().unwrap();
    mirror(home.path()).arg("init").assert().success();

    mirror(home.path())
        .args(["inspect", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown profile 'ghost'"));
}

#[test]
fn daemon_control_without_daemon() {
    let home = TempDir::new().unwrap();

    mirror(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("daemon is not running"));

    let output = mirror(home.path())
        .args(["daemon", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["running"], false);

    mirror(home.path())
        .args(["daemon", "logs", "--lines", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("log file not found"));
}
