//! Shared sync entrypoint used by the CLI and the daemon.

use std::path::Path;

use mirror_core::config;

use crate::{sync_all, sync_profile, SyncError, SyncOptions, SyncReport};

/// Scope for a sync pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every configured profile.
    All,
    /// A single named profile.
    Profile(String),
}

/// Run the sync pipeline for a scope.
pub fn run(
    home: &Path,
    scope: SyncScope,
    options: SyncOptions,
) -> Result<Vec<SyncReport>, SyncError> {
    match scope {
        SyncScope::All => sync_all(home, options),
        SyncScope::Profile(name) => {
            let profile = config::find_profile_at(home, &name)?;
            Ok(vec![sync_profile(home, &profile, options)?])
        }
    }
}
