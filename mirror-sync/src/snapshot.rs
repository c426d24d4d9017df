//! Content manifests: SHA-256 per file for a directory tree.
//!
//! A [`Manifest`] is the opaque content set of an Archive Snapshot or of the
//! Target Directory: `/`-separated relative path → hex digest. Two trees are
//! byte-identical exactly when their manifests are equal. A top-level `.git`
//! is never part of a manifest. Symlinks are not followed; their link target
//! string is hashed instead.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, SyncError};

/// Path → SHA-256 hex digest, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    files: BTreeMap<String, String>,
}

impl Manifest {
    /// Hash every file under `root`. A missing `root` yields an empty manifest.
    pub fn scan(root: &Path) -> Result<Self, SyncError> {
        let mut files = BTreeMap::new();
        let mut pending = vec![(root.to_path_buf(), String::new())];

        while let Some((dir, prefix)) = pending.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound && prefix.is_empty() => {
                    return Ok(Self::default());
                }
                Err(err) => return Err(io_err(&dir, err)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| io_err(&dir, e))?;
                let name = entry.file_name().to_string_lossy().into_owned();
                let path = entry.path();
                let rel = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                let ty = entry.file_type().map_err(|e| io_err(&path, e))?;
                if ty.is_dir() {
                    if prefix.is_empty() && name == ".git" {
                        continue;
                    }
                    pending.push((path, rel));
                } else if ty.is_symlink() {
                    let target = std::fs::read_link(&path).map_err(|e| io_err(&path, e))?;
                    let marker = format!("symlink:{}", target.to_string_lossy());
                    files.insert(rel, hash_bytes(marker.as_bytes()));
                } else {
                    let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
                    files.insert(rel, hash_bytes(&bytes));
                }
            }
        }

        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Single digest identifying the whole content set.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, hash) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update([0]);
            hasher.update(hash.as_bytes());
            hasher.update([b'\n']);
        }
        hex::encode(hasher.finalize())
    }
}

/// SHA-256 hex digest of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Difference between two manifests, each list sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl TreeDiff {
    /// Changes needed to turn `old` into `new`.
    pub fn between(old: &Manifest, new: &Manifest) -> Self {
        let mut diff = Self::default();
        for (path, hash) in &new.files {
            match old.files.get(path) {
                None => diff.added.push(path.clone()),
                Some(previous) if previous != hash => diff.modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in old.files.keys() {
            if !new.files.contains_key(path) {
                diff.removed.push(path.clone());
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::scan(&dir.path().join("nope")).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn nested_paths_use_forward_slashes_and_skip_git() {
        let dir = tree(&[
            ("a.txt", "1"),
            ("season-21/matches/w1.json", "{}"),
            (".git/config", "x"),
            ("nested/.git", "gitfile in subdir is content"),
        ]);
        let manifest = Manifest::scan(dir.path()).unwrap();
        let paths: Vec<&str> = manifest.paths().collect();
        assert_eq!(
            paths,
            vec!["a.txt", "nested/.git", "season-21/matches/w1.json"]
        );
    }

    #[test]
    fn identical_trees_have_equal_manifests_and_digests() {
        let a = tree(&[("a.txt", "1"), ("d/b.txt", "2")]);
        let b = tree(&[("d/b.txt", "2"), ("a.txt", "1")]);
        let ma = Manifest::scan(a.path()).unwrap();
        let mb = Manifest::scan(b.path()).unwrap();
        assert_eq!(ma, mb);
        assert_eq!(ma.digest(), mb.digest());
    }

    #[test]
    fn diff_classifies_added_modified_removed() {
        let old = tree(&[("a.txt", "1"), ("gone.txt", "x"), ("same.txt", "s")]);
        let new = tree(&[("a.txt", "2"), ("new.txt", "n"), ("same.txt", "s")]);
        let diff = TreeDiff::between(
            &Manifest::scan(old.path()).unwrap(),
            &Manifest::scan(new.path()).unwrap(),
        );
        assert_eq!(diff.added, vec!["new.txt"]);
        assert_eq!(diff.modified, vec!["a.txt"]);
        assert_eq!(diff.removed, vec!["gone.txt"]);
        assert_eq!(diff.total(), 3);
    }

    #[test]
    fn content_not_mtime_drives_equality() {
        let a = tree(&[("a.txt", "1")]);
        let before = Manifest::scan(a.path()).unwrap();
        fs::write(a.path().join("a.txt"), "1").unwrap();
        let after = Manifest::scan(a.path()).unwrap();
        assert!(TreeDiff::between(&before, &after).is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn symlinks_are_recorded_not_followed() {
        let dir = tree(&[("real.txt", "content")]);
        std::os::unix::fs::symlink("real.txt", dir.path().join("link")).unwrap();
        let manifest = Manifest::scan(dir.path()).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_ne!(manifest.get("link"), manifest.get("real.txt"));
    }
}
