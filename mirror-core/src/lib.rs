//! Mirror core library: profile types, config persistence, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes, schedule and profile structs
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / init / profile management

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{
    CommitAuthor, DailySchedule, MirrorConfig, ProfileName, SourceSpec, SyncProfile,
};
