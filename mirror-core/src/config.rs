//! YAML config holding every sync profile.
//!
//! # Storage layout
//!
//! ```text
//! ~/.mirror/
//!   config.yaml   (mode 0600, directory mode 0700)
//! ```
//!
//! # Home directory
//!
//! Functions taking `home` are the real implementations; the CLI passes
//! `--config-home` or the user's home through them. The argument-less
//! variants resolve the home with `dirs` and forward. Tests only use the
//! `_at` forms against a `TempDir`.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::ConfigError;
use crate::types::{MirrorConfig, ProfileName, SyncProfile};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.mirror/`
pub fn mirror_root(home: &Path) -> PathBuf {
    home.join(".mirror")
}

/// `<home>/.mirror/config.yaml`, pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    mirror_root(home).join("config.yaml")
}

/// Resolve the home directory from `dirs::home_dir()`.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.mirror/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<MirrorConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<MirrorConfig, ConfigError> {
    load_at(&home()?)
}

/// Load, or an empty config when none has been written yet.
pub fn load_or_empty_at(home: &Path) -> Result<MirrorConfig, ConfigError> {
    match load_at(home) {
        Err(ConfigError::ConfigNotFound { .. }) => Ok(MirrorConfig::empty()),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config to `<home>/.mirror/config.yaml`.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &MirrorConfig) -> Result<(), ConfigError> {
    let dir = mirror_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &MirrorConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Create an empty config.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(home: &Path) -> Result<MirrorConfig, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    let config = MirrorConfig::empty();
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init() -> Result<MirrorConfig, ConfigError> {
    init_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Profiles
// ---------------------------------------------------------------------------

/// Validate and append a profile. Creates the config if needed.
pub fn add_profile_at(home: &Path, profile: SyncProfile) -> Result<SyncProfile, ConfigError> {
    profile.validate()?;
    let mut config = load_or_empty_at(home)?;
    if config.profile(&profile.name.0).is_some() {
        return Err(ConfigError::DuplicateProfile {
            name: profile.name.0,
        });
    }
    config.profiles.push(profile.clone());
    config.updated_at = Utc::now();
    save_at(home, &config)?;
    Ok(profile)
}

/// `add_profile_at` convenience wrapper.
pub fn add_profile(profile: SyncProfile) -> Result<SyncProfile, ConfigError> {
    add_profile_at(&home()?, profile)
}

/// Remove a profile and return it.
pub fn remove_profile_at(home: &Path, name: &ProfileName) -> Result<SyncProfile, ConfigError> {
    let mut config = load_at(home)?;
    let Some(index) = config.profiles.iter().position(|p| &p.name == name) else {
        return Err(ConfigError::ProfileNotFound {
            name: name.0.clone(),
        });
    };
    let removed = config.profiles.remove(index);
    config.updated_at = Utc::now();
    save_at(home, &config)?;
    Ok(removed)
}

/// `remove_profile_at` convenience wrapper.
pub fn remove_profile(name: &ProfileName) -> Result<SyncProfile, ConfigError> {
    remove_profile_at(&home()?, name)
}

pub fn find_profile_at(home: &Path, name: &str) -> Result<SyncProfile, ConfigError> {
    load_at(home)?
        .profiles
        .into_iter()
        .find(|p| p.name.0 == name)
        .ok_or_else(|| ConfigError::ProfileNotFound {
            name: name.to_string(),
        })
}

/// All profiles sorted by name. Empty when no config exists yet.
pub fn list_profiles_at(home: &Path) -> Result<Vec<SyncProfile>, ConfigError> {
    let mut profiles = load_or_empty_at(home)?.profiles;
    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(profiles)
}

/// `list_profiles_at` convenience wrapper.
pub fn list_profiles() -> Result<Vec<SyncProfile>, ConfigError> {
    list_profiles_at(&home()?)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
