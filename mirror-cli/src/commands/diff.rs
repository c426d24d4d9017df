//! `mirror diff <profile>`: preview a sync as unified diffs.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use mirror_core::config;
use mirror_sync::diff_profile;

use super::sync::print_changes;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Profile to diff.
    pub profile: String,
}

impl DiffArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let profile = config::find_profile_at(home, &self.profile)
            .with_context(|| format!("unknown profile '{}'", self.profile))?;
        let result = diff_profile(home, &profile)
            .with_context(|| format!("diff failed for '{}'", self.profile))?;

        if result.changes.is_empty() {
            println!("No differences for '{}'.", result.profile);
            return Ok(());
        }

        println!(
            "'{}': {} added, {} modified, {} removed",
            result.profile,
            result.changes.added.len(),
            result.changes.modified.len(),
            result.changes.removed.len()
        );
        print_changes(&result.changes);
        for diff in result.diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}
