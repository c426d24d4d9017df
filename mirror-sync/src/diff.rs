//! Preview support for `mirror diff`.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use similar::TextDiff;

use mirror_core::SyncProfile;

use crate::{
    error::io_err,
    fetch::fetch_snapshot,
    lock::RunLock,
    snapshot::{Manifest, TreeDiff},
    syncer::Workspace,
    tree::recover_interrupted_swap,
    SyncError,
};

/// Unified diff of one modified text file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    /// Path relative to the target directory.
    pub path: String,
    pub unified_diff: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub profile: String,
    pub source_revision: Option<String>,
    pub changes: TreeDiff,
    /// Text diffs for modified UTF-8 files; binary files appear only in `changes`.
    pub diffs: Vec<FileDiff>,
}

/// Fetch the archive and compare it with the current target.
///
/// Nothing in the work tree, index or remote changes; the staged fetch is
/// deleted before returning.
pub fn diff_profile(home: &Path, profile: &SyncProfile) -> Result<DiffReport, SyncError> {
    let _lock = RunLock::acquire(home, &profile.name.0)?;
    let ws = Workspace::open(profile)?;
    recover_interrupted_swap(&ws.staging, &ws.target)?;

    let snapshot = fetch_snapshot(&profile.source, &ws.staging)?;
    let result = compare(&ws.target, &snapshot.path, &snapshot.manifest);
    ws.staging.discard();
    let (changes, diffs) = result?;

    Ok(DiffReport {
        profile: profile.name.0.clone(),
        source_revision: snapshot.revision,
        changes,
        diffs,
    })
}

fn compare(
    target: &Path,
    staged: &Path,
    incoming: &Manifest,
) -> Result<(TreeDiff, Vec<FileDiff>), SyncError> {
    let current = Manifest::scan(target)?;
    let changes = TreeDiff::between(&current, incoming);

    let mut diffs = Vec::new();
    for rel in &changes.modified {
        let (Some(old), Some(new)) = (
            read_text(&target.join(rel))?,
            read_text(&staged.join(rel))?,
        ) else {
            continue;
        };
        let old_header = format!("a/{rel}");
        let new_header = format!("b/{rel}");
        let unified = TextDiff::from_lines(&old, &new)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();
        diffs.push(FileDiff {
            path: rel.clone(),
            unified_diff: unified,
        });
    }
    Ok((changes, diffs))
}

/// File contents as text, `None` if missing or not UTF-8.
fn read_text(path: &Path) -> Result<Option<String>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8(bytes).ok()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}
