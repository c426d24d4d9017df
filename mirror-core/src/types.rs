//! Domain types for mirror profiles.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a sync profile in the config.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileName(pub String);

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProfileName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProfileName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Daily run time, `HH:MM` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DailySchedule(NaiveTime);

impl DailySchedule {
    pub fn new(time: NaiveTime) -> Self {
        Self(time)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// First run strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = Utc.from_utc_datetime(&now.date_naive().and_time(self.0));
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }

    /// Most recent scheduled run at or before `now`.
    pub fn previous_at_or_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.next_after(now) - Duration::days(1)
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self(NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN))
    }
}

impl FromStr for DailySchedule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| ConfigError::InvalidSchedule {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for DailySchedule {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DailySchedule> for String {
    fn from(s: DailySchedule) -> Self {
        s.to_string()
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// The external archive repository a profile mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Anything `git clone` accepts.
    pub url: String,
    /// Branch or tag to fetch; the remote's default branch when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

/// Identity recorded on mirror commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self {
            name: "github-actions[bot]".to_string(),
            email: "41898282+github-actions[bot]@users.noreply.github.com".to_string(),
        }
    }
}

pub const DEFAULT_COMMIT_MESSAGE: &str = "Update {target} from {source}";

/// One configured mirror job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProfile {
    pub name: ProfileName,
    pub source: SourceSpec,
    /// Local git work tree receiving the mirror.
    pub repo: PathBuf,
    /// Directory inside `repo` that is replaced on every run.
    pub target_dir: PathBuf,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub schedule: DailySchedule,
    #[serde(default = "default_push_retries")]
    pub push_retries: u32,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default)]
    pub author: CommitAuthor,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_push_retries() -> u32 {
    3
}

fn default_commit_message() -> String {
    DEFAULT_COMMIT_MESSAGE.to_string()
}

impl SyncProfile {
    /// Profile with defaults for every optional field.
    pub fn new(
        name: impl Into<ProfileName>,
        source_url: impl Into<String>,
        repo: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source: SourceSpec {
                url: source_url.into(),
                git_ref: None,
            },
            repo: repo.into(),
            target_dir: target_dir.into(),
            remote: default_remote(),
            branch: default_branch(),
            schedule: DailySchedule::default(),
            push_retries: default_push_retries(),
            commit_message: default_commit_message(),
            author: CommitAuthor::default(),
        }
    }

    /// Absolute (or repo-relative, if `repo` is relative) path of the target.
    pub fn target_path(&self) -> PathBuf {
        self.repo.join(&self.target_dir)
    }

    /// Render the commit message template.
    ///
    /// Placeholders: `{target}`, `{source}`, `{revision}`.
    pub fn render_commit_message(&self, revision: Option<&str>) -> String {
        let revision = revision
            .map(|r| r.chars().take(12).collect::<String>())
            .unwrap_or_else(|| "unknown".to_string());
        self.commit_message
            .replace("{target}", &self.target_dir.to_string_lossy())
            .replace("{source}", &self.source.url)
            .replace("{revision}", &revision)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidProfile {
            name: self.name.0.clone(),
            reason: reason.to_string(),
        };

        if self.name.0.is_empty()
            || !self
                .name
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(invalid("name must be non-empty [A-Za-z0-9._-]"));
        }
        if self.source.url.trim().is_empty() {
            return Err(invalid("source url is empty"));
        }
        if self.remote.trim().is_empty() {
            return Err(invalid("remote is empty"));
        }
        if self.branch.trim().is_empty() {
            return Err(invalid("branch is empty"));
        }
        validate_target_dir(&self.target_dir).map_err(invalid)?;
        Ok(())
    }
}

fn validate_target_dir(target: &Path) -> Result<(), &'static str> {
    if target.as_os_str().is_empty() {
        return Err("target_dir is empty");
    }
    for (index, component) in target.components().enumerate() {
        match component {
            Component::Normal(part) => {
                if index == 0 && part.to_string_lossy().starts_with(".git") {
                    return Err("target_dir must not point into .git");
                }
            }
            Component::CurDir => return Err("target_dir must not contain '.'"),
            Component::ParentDir => return Err("target_dir must not contain '..'"),
            Component::RootDir | Component::Prefix(_) => {
                return Err("target_dir must be relative to the repository")
            }
        }
    }
    Ok(())
}

/// Root of the mirror YAML config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub version: u32,
    #[serde(default)]
    pub profiles: Vec<SyncProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MirrorConfig {
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            version: 1,
            profiles: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn profile(&self, name: &str) -> Option<&SyncProfile> {
        self.profiles.iter().find(|p| p.name.0 == name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn schedule_parse_and_display() {
        let s: DailySchedule = "06:30".parse().unwrap();
        assert_eq!(s.to_string(), "06:30");
        assert!("6am".parse::<DailySchedule>().is_err());
        assert!("25:00".parse::<DailySchedule>().is_err());
    }

    #[test]
    fn next_after_same_day_when_time_ahead() {
        let s: DailySchedule = "06:00".parse().unwrap();
        assert_eq!(
            s.next_after(at("2024-03-01T05:59:00Z")),
            at("2024-03-01T06:00:00Z")
        );
    }

    #[test]
    fn next_after_rolls_to_tomorrow_at_or_past_time() {
        let s: DailySchedule = "06:00".parse().unwrap();
        assert_eq!(
            s.next_after(at("2024-03-01T06:00:00Z")),
            at("2024-03-02T06:00:00Z")
        );
        assert_eq!(
            s.previous_at_or_before(at("2024-03-01T06:00:00Z")),
            at("2024-03-01T06:00:00Z")
        );
    }

    #[test]
    fn commit_message_placeholders() {
        let mut p = SyncProfile::new("main", "https://x/archive", "/repo", "archive");
        p.commit_message = "Update {target} ({revision}) from {source}".to_string();
        assert_eq!(
            p.render_commit_message(Some("0123456789abcdef")),
            "Update archive (0123456789ab) from https://x/archive"
        );
        assert_eq!(
            p.render_commit_message(None),
            "Update archive (unknown) from https://x/archive"
        );
    }

    #[test]
    fn validate_rejects_escaping_targets() {
        for bad in ["", "../up", "/abs", ".git/hooks", "a/../b", "./x"] {
            let p = SyncProfile::new("main", "u", "/repo", bad);
            assert!(p.validate().is_err(), "{bad:?} should be rejected");
        }
        let ok = SyncProfile::new("main", "u", "/repo", "data/archive");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_names() {
        let p = SyncProfile::new("has space", "u", "/repo", "archive");
        assert!(matches!(
            p.validate(),
            Err(ConfigError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn profile_defaults_fill_in_from_minimal_yaml() {
        let yaml = "name: beta\nsource:\n  url: https://example.com/a.git\nrepo: /r\ntarget_dir: archive\n";
        let p: SyncProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.remote, "origin");
        assert_eq!(p.branch, "main");
        assert_eq!(p.push_retries, 3);
        assert_eq!(p.schedule.to_string(), "06:00");
        assert_eq!(p.author, CommitAuthor::default());
    }
}
