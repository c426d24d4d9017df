//! Sync records: the last outcome of each profile.
//!
//! Persists a [`SyncRecord`] JSON document at
//! `<home>/.mirror/state/<profile>.json`, written with the same atomic
//! `.tmp` + rename pattern as the config. Records are informational: the
//! committed tree is the source of truth, so a missing or unreadable record
//! never blocks a sync.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mirror_core::config::mirror_root;

use crate::error::{io_err, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Updated,
    NoChanges,
    Failed,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::NoChanges => "no changes",
            Self::Failed => "failed",
        }
    }
}

/// What happened on the most recent non-dry run of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub synced_at: DateTime<Utc>,
    pub outcome: RecordOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
    #[serde(default)]
    pub files: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time of the last run that did not fail, carried across failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
}

impl SyncRecord {
    pub fn failed(error: impl Into<String>, previous: Option<&SyncRecord>) -> Self {
        Self {
            synced_at: Utc::now(),
            outcome: RecordOutcome::Failed,
            commit: None,
            source_revision: None,
            files: 0,
            manifest_digest: None,
            error: Some(error.into()),
            last_success: previous.and_then(SyncRecord::last_success_at),
        }
    }

    /// When this profile last completed without error, if ever.
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        match self.outcome {
            RecordOutcome::Failed => self.last_success,
            _ => Some(self.synced_at),
        }
    }
}

/// `<home>/.mirror/state/<profile>.json`
pub fn record_path_at(home: &Path, profile: &str) -> PathBuf {
    mirror_root(home)
        .join("state")
        .join(format!("{profile}.json"))
}

/// Load the record for `profile`, `None` if it was never synced.
pub fn load_at(home: &Path, profile: &str) -> Result<Option<SyncRecord>, SyncError> {
    let path = record_path_at(home, profile);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save the record for `profile` atomically.
pub fn save_at(home: &Path, profile: &str, record: &SyncRecord) -> Result<(), SyncError> {
    let path = record_path_at(home, profile);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid sync record path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}
