//! Explicit runtime configuration.
//!
//! # Responsibility
//! - Resolve store, log and listing-source settings once per invocation.
//! - Hand them to constructors; nothing reads the environment afterwards.
//!
//! # Invariants
//! - Every configured path is absolute.

use crate::logging::default_log_level;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_STORE_FILE: &str = ".calendar_events.db";
pub const DEFAULT_LOG_SUBDIR: &str = ".calendarbuddy/logs";
pub const DEFAULT_RAW_DUMP_FILE: &str = "icalbuddy_raw.txt";
pub const DEFAULT_BINARY: &str = "icalBuddy";
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_STORE_PATH: &str = "CALBUDDY_DB";
pub const ENV_LOG_DIR: &str = "CALBUDDY_LOG_DIR";
pub const ENV_LOG_LEVEL: &str = "CALBUDDY_LOG_LEVEL";
pub const ENV_BINARY: &str = "CALBUDDY_ICALBUDDY";
pub const ENV_TIMEOUT_SECS: &str = "CALBUDDY_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingHome,
    RelativePath { setting: &'static str, path: PathBuf },
    InvalidValue { setting: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHome => {
                write!(f, "home directory not found; cannot resolve default paths")
            }
            Self::RelativePath { setting, path } => {
                write!(f, "{setting} must be an absolute path, got `{}`", path.display())
            }
            Self::InvalidValue { setting, value } => {
                write!(f, "invalid value `{value}` for {setting}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Listing collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub binary: String,
    pub timeout: Duration,
    /// Best-effort copy of the raw listing, written only when requested.
    pub raw_dump_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuddyConfig {
    pub store_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub lookback_days: u32,
    pub source: SourceConfig,
}

impl BuddyConfig {
    /// Defaults rooted at `home`.
    pub fn from_home(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref();
        Self {
            store_path: home.join(DEFAULT_STORE_FILE),
            log_dir: home.join(DEFAULT_LOG_SUBDIR),
            log_level: default_log_level().to_string(),
            lookback_days: 0,
            source: SourceConfig {
                binary: DEFAULT_BINARY.to_string(),
                timeout: DEFAULT_SOURCE_TIMEOUT,
                raw_dump_path: home.join(DEFAULT_RAW_DUMP_FILE),
            },
        }
    }

    /// Defaults under the user's home directory, then `CALBUDDY_*` overrides.
    ///
    /// # Errors
    /// - `MissingHome` when no home directory can be resolved.
    /// - `RelativePath` / `InvalidValue` for malformed overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = resolve_home(dirs::home_dir())?;
        Self::from_home(home).with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `CALBUDDY_*` values produced by `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = value(ENV_STORE_PATH) {
            self.store_path = absolute(ENV_STORE_PATH, PathBuf::from(path))?;
        }
        if let Some(path) = value(ENV_LOG_DIR) {
            self.log_dir = absolute(ENV_LOG_DIR, PathBuf::from(path))?;
        }
        if let Some(level) = value(ENV_LOG_LEVEL) {
            self.log_level = level.trim().to_string();
        }
        if let Some(binary) = value(ENV_BINARY) {
            self.source.binary = binary.trim().to_string();
        }
        if let Some(secs) = value(ENV_TIMEOUT_SECS) {
            let parsed = secs
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    setting: ENV_TIMEOUT_SECS,
                    value: secs.clone(),
                })?;
            self.source.timeout = Duration::from_secs(parsed);
        }
        Ok(self)
    }

    /// Checks the invariants after command-line overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        absolute("store path", self.store_path.clone())?;
        absolute("log dir", self.log_dir.clone())?;
        if self.source.binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                setting: "listing binary",
                value: self.source.binary.clone(),
            });
        }
        Ok(())
    }
}

fn resolve_home(home: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    home.filter(|path| !path.as_os_str().is_empty())
        .ok_or(ConfigError::MissingHome)
}

fn absolute(setting: &'static str, path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(ConfigError::RelativePath { setting, path })
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_home, BuddyConfig, ConfigError, DEFAULT_SOURCE_TIMEOUT};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn home_defaults_match_legacy_locations() {
        let config = BuddyConfig::from_home("/Users/me");
        assert_eq!(config.store_path, PathBuf::from("/Users/me/.calendar_events.db"));
        assert_eq!(config.log_dir, PathBuf::from("/Users/me/.calendarbuddy/logs"));
        assert_eq!(
            config.source.raw_dump_path,
            PathBuf::from("/Users/me/icalbuddy_raw.txt")
        );
        assert_eq!(config.source.binary, "icalBuddy");
        assert_eq!(config.source.timeout, DEFAULT_SOURCE_TIMEOUT);
        assert_eq!(config.lookback_days, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_replace_defaults() {
        let config = BuddyConfig::from_home("/home/me")
            .with_overrides(lookup(&[
                ("CALBUDDY_DB", "/tmp/events.db"),
                ("CALBUDDY_TIMEOUT_SECS", "5"),
                ("CALBUDDY_LOG_LEVEL", "warn"),
                ("CALBUDDY_LOG_DIR", "  "),
            ]))
            .unwrap();
        assert_eq!(config.store_path, PathBuf::from("/tmp/events.db"));
        assert_eq!(config.source.timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, PathBuf::from("/home/me/.calendarbuddy/logs"));
    }

    #[test]
    fn relative_store_override_is_rejected() {
        let err = BuddyConfig::from_home("/home/me")
            .with_overrides(lookup(&[("CALBUDDY_DB", "events.db")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::RelativePath { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = BuddyConfig::from_home("/home/me")
            .with_overrides(lookup(&[("CALBUDDY_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn unresolved_home_is_reported() {
        assert_eq!(resolve_home(None), Err(ConfigError::MissingHome));
        assert_eq!(
            resolve_home(Some(PathBuf::new())),
            Err(ConfigError::MissingHome)
        );
        assert_eq!(
            resolve_home(Some(PathBuf::from("/home/me"))),
            Ok(PathBuf::from("/home/me"))
        );
    }
}
