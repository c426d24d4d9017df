//! Retrieve an Archive Snapshot into the staging area.
//!
//! The source is shallow-cloned into `<staging>/tree`, its revision noted,
//! and its `.git` removed so only the file tree remains. On any failure the
//! staged tree is deleted; the target directory is never touched here.

use std::path::PathBuf;

use mirror_core::SourceSpec;

use crate::error::{io_err, SyncError};
use crate::git;
use crate::snapshot::Manifest;
use crate::tree::StagingArea;

/// A fetched archive tree waiting in staging.
#[derive(Debug, Clone)]
pub struct FetchedSnapshot {
    pub path: PathBuf,
    /// Source commit the tree was taken from.
    pub revision: Option<String>,
    pub manifest: Manifest,
}

/// Fetch `source` into `staging`.
pub fn fetch_snapshot(
    source: &SourceSpec,
    staging: &StagingArea,
) -> Result<FetchedSnapshot, SyncError> {
    staging.prepare()?;
    match clone_and_strip(source, staging) {
        Ok(snapshot) => {
            tracing::info!(
                "fetched {} @ {} ({} files)",
                source.url,
                snapshot.revision.as_deref().unwrap_or("unknown"),
                snapshot.manifest.len()
            );
            Ok(snapshot)
        }
        Err(err) => {
            staging.discard();
            Err(err)
        }
    }
}

fn clone_and_strip(
    source: &SourceSpec,
    staging: &StagingArea,
) -> Result<FetchedSnapshot, SyncError> {
    let tree = staging.tree_path();
    git::clone_shallow(&source.url, source.git_ref.as_deref(), &tree)?;

    let revision = match git::rev_parse_head(&tree) {
        Ok(rev) => Some(rev),
        Err(err) => {
            tracing::warn!("could not read source revision: {err}");
            None
        }
    };

    let dot_git = tree.join(".git");
    if dot_git.is_dir() {
        std::fs::remove_dir_all(&dot_git).map_err(|e| io_err(&dot_git, e))?;
    } else if dot_git.exists() {
        std::fs::remove_file(&dot_git).map_err(|e| io_err(&dot_git, e))?;
    }

    let manifest = Manifest::scan(&tree)?;
    Ok(FetchedSnapshot {
        path: tree,
        revision,
        manifest,
    })
}
