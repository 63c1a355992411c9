//! Configuration file discovery, defaults and validation.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use taskmaster_store_memory::{DEFAULT_COLLECTION, DEFAULT_MIN_PASSWORD_LEN};

use crate::task_sync::ResubscribePolicy;

const CONFIG_DIR: &str = ".taskmaster";
const CONFIG_FILE: &str = "config.toml";
const APP_DIR: &str = "taskmaster";

/// Top-level configuration loaded from `.taskmaster/config.toml`.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Document collection settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Live feed retry settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Identity provider settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Resolve configuration: explicit path, then the working directory, then the user config dir.
    ///
    /// An explicit path must exist; the other locations fall back to defaults when absent.
    pub fn discover(explicit: Option<&Path>, cwd: impl AsRef<Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let local = cwd.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);
        if local.exists() {
            return Self::from_file(&local);
        }
        match user_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from `<workdir>/.taskmaster/config.toml`, or defaults when missing.
    pub fn from_workdir(workdir: impl AsRef<Path>) -> Result<Self> {
        let config_path = workdir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&config_path)
    }

    /// Load and validate one configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.sync.validate()?;
        self.auth.validate()
    }
}

/// `~/.config/taskmaster/config.toml` on Linux, the platform equivalent elsewhere.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// `[store]` block.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Collection holding task documents.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            bail!("store collection must not be empty");
        }
        Ok(())
    }
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_owned()
}

/// `[sync]` block: backoff used when the live feed fails.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// First retry delay.
    pub initial_backoff_ms: u64,
    /// Upper bound for the retry delay.
    pub max_backoff_ms: u64,
    /// Consecutive failures tolerated before the feed stops.
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_attempts: 8,
        }
    }
}

impl SyncConfig {
    /// Backoff policy described by this block.
    pub const fn policy(&self) -> ResubscribePolicy {
        ResubscribePolicy::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.max_attempts,
        )
    }

    fn validate(&self) -> Result<()> {
        if self.initial_backoff_ms == 0 || self.max_backoff_ms == 0 {
            bail!("sync backoff must be greater than zero");
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            bail!(
                "sync initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms,
                self.max_backoff_ms
            );
        }
        Ok(())
    }
}

/// `[auth]` block.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// Shortest password accepted at sign-up.
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_len: DEFAULT_MIN_PASSWORD_LEN,
        }
    }
}

impl AuthConfig {
    fn validate(&self) -> Result<()> {
        if self.min_password_len == 0 {
            bail!("auth min_password_len must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_config(dir: &Path, body: &str) -> Result<PathBuf> {
        let cfg_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&cfg_dir)?;
        let path = cfg_dir.join(CONFIG_FILE);
        let mut file = fs::File::create(&path)?;
        writeln!(file, "{body}")?;
        Ok(path)
    }

    #[test]
    fn missing_config_returns_defaults() -> Result<()> {
        let dir = tempdir()?;
        let cfg = AppConfig::from_workdir(dir.path())?;
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.store.collection, "tasks");
        assert_eq!(cfg.sync.policy(), ResubscribePolicy::default());
        assert_eq!(cfg.auth.min_password_len, 6);
        Ok(())
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path(), "[store]\ncollection = \"todo\"\n[sync]\nmax_attempts = 2")?;

        let cfg = AppConfig::from_workdir(dir.path())?;
        assert_eq!(cfg.store.collection, "todo");
        assert_eq!(cfg.sync.max_attempts, 2);
        assert_eq!(cfg.sync.initial_backoff_ms, 500);
        assert_eq!(cfg.auth, AuthConfig::default());
        Ok(())
    }

    #[test]
    fn explicit_path_wins_over_workdir() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path(), "[store]\ncollection = \"local\"")?;
        let other = tempdir()?;
        let explicit = write_config(other.path(), "[store]\ncollection = \"explicit\"")?;

        let cfg = AppConfig::discover(Some(&explicit), dir.path())?;
        assert_eq!(cfg.store.collection, "explicit");
        let cfg = AppConfig::discover(None, dir.path())?;
        assert_eq!(cfg.store.collection, "local");
        Ok(())
    }

    #[test]
    fn missing_explicit_path_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::discover(Some(&missing), dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn empty_collection_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path(), "[store]\ncollection = \"  \"")?;

        let Err(err) = AppConfig::from_workdir(dir.path()) else {
            panic!("empty collection should error");
        };
        assert!(format!("{err:#}").contains("store collection must not be empty"));
        Ok(())
    }

    #[test]
    fn inverted_backoff_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path(), "[sync]\ninitial_backoff_ms = 5000\nmax_backoff_ms = 100")?;

        let Err(err) = AppConfig::from_workdir(dir.path()) else {
            panic!("initial > max should error");
        };
        assert!(format!("{err:#}").contains("exceeds max_backoff_ms"));
        Ok(())
    }

    #[test]
    fn zero_backoff_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path(), "[sync]\ninitial_backoff_ms = 0")?;
        assert!(AppConfig::from_workdir(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn unparsable_file_reports_path() -> Result<()> {
        let dir = tempdir()?;
        let path = write_config(dir.path(), "[store\ncollection = 1")?;

        let Err(err) = AppConfig::from_workdir(dir.path()) else {
            panic!("broken toml should error");
        };
        assert!(err.to_string().contains(&path.display().to_string()));
        Ok(())
    }
}
