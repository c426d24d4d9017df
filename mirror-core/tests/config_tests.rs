//! Config error-message, atomic-write-safety and profile management tests.

use assert_fs::prelude::*;
use mirror_core::{config, ConfigError, ProfileName, SyncProfile};
use predicates::prelude::predicate;
use std::fs;

fn archive_profile(name: &str, branch: &str) -> SyncProfile {
    let mut p = SyncProfile::new(
        name,
        "https://github.com/Invader-Zim/mnp-data-archive",
        "/srv/site",
        "mnp-data-archive",
    );
    p.branch = branch.to_string();
    p
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
    assert!(err.to_string().contains("mirror init"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = home.path().join(".mirror");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("config.yaml"), b": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_bad_schedule_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".mirror/config.yaml")
        .write_str(
            "version: 1\ncreated_at: 2024-01-01T00:00:00Z\nupdated_at: 2024-01-01T00:00:00Z\n\
             profiles:\n  - name: main\n    source:\n      url: https://x\n    repo: /r\n    \
             target_dir: a\n    schedule: \"noon\"\n",
        )
        .expect("write");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("noon"), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Save / init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::init_at(home.path()).expect("init");
    home.child(".mirror/config.yaml")
        .assert(predicate::path::exists());
    home.child(".mirror/config.yaml")
        .assert(predicate::str::contains("version: 1"));
}

#[test]
fn leftover_tmp_does_not_break_save() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".mirror/config.yaml.tmp")
        .write_str("garbage from a crashed write")
        .expect("write");
    config::init_at(home.path()).expect("init");
    home.child(".mirror/config.yaml.tmp")
        .assert(predicate::path::missing());
    config::load_at(home.path()).expect("config loads cleanly");
}

// ---------------------------------------------------------------------------
// 3. Profiles
// ---------------------------------------------------------------------------

#[test]
fn beta_and_main_profiles_share_one_config() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::add_profile_at(home.path(), archive_profile("main", "main")).expect("main");
    config::add_profile_at(home.path(), archive_profile("beta", "beta")).expect("beta");

    let beta = config::find_profile_at(home.path(), "beta").expect("find beta");
    assert_eq!(beta.branch, "beta");
    assert_eq!(beta.target_dir, std::path::PathBuf::from("mnp-data-archive"));
    assert_eq!(config::list_profiles_at(home.path()).unwrap().len(), 2);
}

#[test]
fn duplicate_profile_is_rejected() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::add_profile_at(home.path(), archive_profile("main", "main")).expect("first");
    let err = config::add_profile_at(home.path(), archive_profile("main", "beta")).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateProfile { .. }), "got: {err}");
}

#[test]
fn invalid_profile_is_not_persisted() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut bad = archive_profile("main", "main");
    bad.target_dir = "../outside".into();
    let err = config::add_profile_at(home.path(), bad).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidProfile { .. }), "got: {err}");
    home.child(".mirror/config.yaml")
        .assert(predicate::path::missing());
}

#[test]
fn remove_profile_leaves_the_others() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::add_profile_at(home.path(), archive_profile("main", "main")).unwrap();
    config::add_profile_at(home.path(), archive_profile("beta", "beta")).unwrap();

    let removed = config::remove_profile_at(home.path(), &ProfileName::from("beta")).unwrap();
    assert_eq!(removed.name.0, "beta");

    let err = config::find_profile_at(home.path(), "beta").unwrap_err();
    assert!(matches!(err, ConfigError::ProfileNotFound { .. }));
    config::find_profile_at(home.path(), "main").expect("main survives");
}
