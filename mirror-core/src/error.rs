//! Error types for mirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, cannot locate `~/.mirror/`.
    #[error("cannot determine home directory; set $HOME or pass --config-home")]
    HomeNotFound,

    /// The config YAML file did not exist at the expected path.
    #[error("config not found at {path}; run `mirror init` first")]
    ConfigNotFound { path: PathBuf },

    #[error("no profile named '{name}'")]
    ProfileNotFound { name: String },

    #[error("profile '{name}' already exists")]
    DuplicateProfile { name: String },

    /// A profile failed validation; `reason` names the offending field.
    #[error("invalid profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("invalid schedule '{value}': expected HH:MM (24h, UTC)")]
    InvalidSchedule { value: String },
}
