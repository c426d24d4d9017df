//! # mirror-sync
//!
//! Archive Syncer: fetch an external repository's tree, swap it atomically
//! into a target directory, and commit + push when the contents changed.
//!
//! Call [`sync_profile`] to run one configured profile, or [`sync_all`] to
//! process every profile in the config.

pub mod diff;
pub mod error;
pub mod fetch;
pub mod git;
pub mod inspect;
pub mod lock;
pub mod pipeline;
pub mod snapshot;
pub mod staleness;
pub mod state;
pub mod syncer;
pub mod tree;

pub use diff::{diff_profile, DiffReport, FileDiff};
pub use error::SyncError;
pub use inspect::{inspect_profile, Inspection};
pub use snapshot::{Manifest, TreeDiff};
pub use staleness::Freshness;
pub use syncer::{sync_all, sync_profile, SyncOptions, SyncOutcome, SyncReport};
