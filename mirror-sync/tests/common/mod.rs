//! Throwaway git repositories for sync tests.
//!
//! Layout inside one temp dir:
//! - `source/`: the archive repository (plain work tree)
//! - `remote.git`: bare repository standing in for the hosted remote
//! - `work/`: the local repository that receives the mirror

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use mirror_core::SyncProfile;
use tempfile::TempDir;

pub struct GitFixture {
    pub dir: TempDir,
    pub home: TempDir,
    pub source: PathBuf,
    pub remote: PathBuf,
    pub work: PathBuf,
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed in {}: {}",
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = root.join(path);
        fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
        fs::write(full, content).expect("write");
    }
}

impl GitFixture {
    /// Source seeded with `files`; work repo has one README commit pushed.
    pub fn new(files: &[(&str, &str)]) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let dir = TempDir::new().expect("fixture dir");
        let home = TempDir::new().expect("home");
        let source = dir.path().join("source");
        let remote = dir.path().join("remote.git");
        let work = dir.path().join("work");

        fs::create_dir_all(&source).expect("mkdir source");
        git(&source, &["init", "-q"]);
        git(&source, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        write_files(&source, files);
        git(&source, &["add", "-A"]);
        git(&source, &["commit", "-q", "--allow-empty", "-m", "seed archive"]);

        git(dir.path(), &["init", "-q", "--bare", "remote.git"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        fs::create_dir_all(&work).expect("mkdir work");
        git(&work, &["init", "-q"]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        write_files(&work, &[("README.md", "site\n")]);
        git(&work, &["add", "-A"]);
        git(&work, &["commit", "-q", "-m", "initial"]);
        git(&work, &["remote", "add", "origin", remote.to_str().expect("utf8")]);
        git(&work, &["push", "-q", "-u", "origin", "main"]);

        Self {
            dir,
            home,
            source,
            remote,
            work,
        }
    }

    pub fn source_url(&self) -> String {
        format!("file://{}", self.source.display())
    }

    pub fn profile(&self) -> SyncProfile {
        SyncProfile::new("main", self.source_url(), &self.work, "archive")
    }

    pub fn target(&self) -> PathBuf {
        self.work.join("archive")
    }

    /// Commit new content to the archive.
    pub fn update_source(&self, files: &[(&str, &str)], removed: &[&str]) {
        write_files(&self.source, files);
        for path in removed {
            fs::remove_file(self.source.join(path)).expect("remove source file");
        }
        git(&self.source, &["add", "-A"]);
        git(&self.source, &["commit", "-q", "-m", "archive update"]);
    }

    pub fn work_commits(&self) -> u32 {
        git(&self.work, &["rev-list", "--count", "HEAD"])
            .parse()
            .expect("count")
    }

    pub fn remote_subjects(&self) -> Vec<String> {
        git(&self.remote, &["log", "--format=%s", "main"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Push an unrelated commit to the remote from a second clone.
    pub fn advance_remote(&self, file: &str) {
        self.advance_remote_with(&[(file, "from elsewhere\n")], &format!("add {file}"));
    }

    /// Push `files` as one commit to the remote from a second clone.
    pub fn advance_remote_with(&self, files: &[(&str, &str)], message: &str) {
        let other = self.dir.path().join("other");
        if !other.exists() {
            git(
                self.dir.path(),
                &["clone", "-q", self.remote.to_str().expect("utf8"), "other"],
            );
        } else {
            git(&other, &["pull", "-q", "--rebase", "origin", "main"]);
        }
        write_files(&other, files);
        git(&other, &["add", "-A"]);
        git(&other, &["commit", "-q", "-m", message]);
        git(&other, &["push", "-q", "origin", "HEAD:main"]);
    }

    pub fn head_subject(&self) -> String {
        git(&self.work, &["log", "-1", "--format=%s"])
    }
}
