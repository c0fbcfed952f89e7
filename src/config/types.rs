//! Store configuration and its builder

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bootstrap::{DeploymentBootstrap, IdentitySeed};
use crate::error::{Error, Result};
use crate::storage::{JsonStorage, StorageBackend};
use crate::value::{SettingValue, split_key};

/// Default number of recent files kept
pub const DEFAULT_MRU_CAPACITY: usize = 8;

/// Source of environment variables.
///
/// The bootstrap reads the user name and the debug marker through this, so
/// tests can supply a fixed environment.
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEnvSource;

impl EnvSource for DefaultEnvSource {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// When user-layer changes reach disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Mark the store dirty; write on save, close, shutdown or drop
    #[default]
    Deferred,
    /// Write the user file after every accepted user-layer change
    Immediate,
}

/// Configuration for a [`ConfigStore`](crate::ConfigStore)
pub struct StoreConfig<S: StorageBackend = JsonStorage> {
    /// Application name, used as built-in product name and directory name
    pub app_name: String,

    /// Built-in version, used when the descriptor does not set one
    pub app_version: String,

    /// Built-in creator, used when the descriptor does not set one
    pub creator: String,

    /// Home directory fallback when the descriptor has no `home-path`
    pub home_dir: Option<PathBuf>,

    /// User config directory fallback when the descriptor has no
    /// `user-config-path`
    pub config_dir: Option<PathBuf>,

    /// Explicit descriptor locations; `None` searches the standard ones
    pub descriptor_candidates: Option<Vec<PathBuf>>,

    /// File name stem of the per-user settings file
    pub settings_prefix: String,

    /// File name stem of the per-user recent-files list
    pub mru_prefix: String,

    /// Storage backend implementation
    pub storage: S,

    /// Recent files kept until `FileMenu/NumberOfMruFiles` says otherwise
    pub mru_capacity: usize,

    pub write_policy: WritePolicy,

    /// Prefix of the `{PREFIX}_DEBUG` marker variable
    pub env_prefix: String,

    pub env_source: Arc<dyn EnvSource>,

    /// Minimal defaults compiled into the application, seeded before any
    /// default file
    pub defaults: Vec<(String, SettingValue)>,
}

impl StoreConfig<JsonStorage> {
    /// Create a new builder for `StoreConfig`
    ///
    /// # Example
    /// ```rust
    /// use strata::StoreConfig;
    ///
    /// let config = StoreConfig::builder("viewer", "1.0.0")
    ///     .config_dir("~/.config/viewer")
    ///     .with_default("General/Theme", "light")
    ///     .build();
    /// assert_eq!(config.mru_capacity, 8);
    /// ```
    pub fn builder(
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> StoreConfigBuilder<JsonStorage> {
        StoreConfigBuilder::new(app_name, app_version)
    }
}

impl<S: StorageBackend> StoreConfig<S> {
    /// Check the configuration before a store is built from it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty application name, a zero MRU
    /// capacity or empty file prefixes, and [`Error::InvalidKey`] for a
    /// malformed default key.
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(Error::Config("application name must not be empty".into()));
        }
        if self.mru_capacity == 0 {
            return Err(Error::Config("MRU capacity must be greater than 0".into()));
        }
        if self.settings_prefix.is_empty() || self.mru_prefix.is_empty() {
            return Err(Error::Config("file prefixes must not be empty".into()));
        }
        for (key, _) in &self.defaults {
            split_key(key)?;
        }
        Ok(())
    }

    /// Bootstrap that searches and parses descriptors for this configuration
    #[must_use]
    pub fn bootstrap(&self) -> DeploymentBootstrap {
        DeploymentBootstrap::new(self.identity_seed())
    }

    pub(crate) fn identity_seed(&self) -> IdentitySeed {
        IdentitySeed {
            app_name: self.app_name.clone(),
            app_version: self.app_version.clone(),
            creator: self.creator.clone(),
            home_dir: self.home_dir.clone(),
            config_dir: self.config_dir.clone(),
            candidates: self.descriptor_candidates.clone(),
            env_prefix: self.env_prefix.clone(),
            env: Arc::clone(&self.env_source),
        }
    }
}

/// Builder for creating `StoreConfig` with a fluent API
#[derive(Clone)]
pub struct StoreConfigBuilder<S: StorageBackend = JsonStorage> {
    app_name: String,
    app_version: String,
    creator: String,
    home_dir: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    descriptor_candidates: Option<Vec<PathBuf>>,
    settings_prefix: String,
    mru_prefix: String,
    storage: S,
    mru_capacity: usize,
    write_policy: WritePolicy,
    env_prefix: Option<String>,
    env_source: Arc<dyn EnvSource>,
    defaults: Vec<(String, SettingValue)>,
}

impl<S: StorageBackend + std::fmt::Debug> std::fmt::Debug for StoreConfigBuilder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfigBuilder")
            .field("app_name", &self.app_name)
            .field("app_version", &self.app_version)
            .field("home_dir", &self.home_dir)
            .field("config_dir", &self.config_dir)
            .field("descriptor_candidates", &self.descriptor_candidates)
            .field("storage", &self.storage)
            .field("mru_capacity", &self.mru_capacity)
            .field("write_policy", &self.write_policy)
            .field("env_prefix", &self.env_prefix)
            .field("defaults", &self.defaults.len())
            .finish_non_exhaustive()
    }
}

impl StoreConfigBuilder<JsonStorage> {
    /// Create a new builder with required app name and version
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            creator: String::new(),
            home_dir: None,
            config_dir: None,
            descriptor_candidates: None,
            settings_prefix: "UserSettings".into(),
            mru_prefix: "RecentFiles".into(),
            storage: JsonStorage::new(),
            mru_capacity: DEFAULT_MRU_CAPACITY,
            write_policy: WritePolicy::default(),
            env_prefix: None,
            env_source: Arc::new(DefaultEnvSource),
            defaults: Vec::new(),
            app_version: app_version.into(),
            app_name,
        }
    }

    /// Use compact JSON (no pretty printing)
    pub fn compact_json(mut self) -> Self {
        self.storage = JsonStorage::compact();
        self
    }
}

impl<S: StorageBackend> StoreConfigBuilder<S> {
    /// Swap the storage backend
    pub fn with_storage<T: StorageBackend>(self, storage: T) -> StoreConfigBuilder<T> {
        StoreConfigBuilder {
            app_name: self.app_name,
            app_version: self.app_version,
            creator: self.creator,
            home_dir: self.home_dir,
            config_dir: self.config_dir,
            descriptor_candidates: self.descriptor_candidates,
            settings_prefix: self.settings_prefix,
            mru_prefix: self.mru_prefix,
            storage,
            mru_capacity: self.mru_capacity,
            write_policy: self.write_policy,
            env_prefix: self.env_prefix,
            env_source: self.env_source,
            defaults: self.defaults,
        }
    }

    /// Built-in creator name
    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Set the home directory used when the descriptor has none.
    ///
    /// Supports `~` expansion for home directory.
    pub fn home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(expand_tilde(path.into()));
        self
    }

    /// Set the user configuration directory used when the descriptor has none.
    ///
    /// Supports `~` expansion for home directory.
    pub fn config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(expand_tilde(path.into()));
        self
    }

    /// Add an explicit descriptor location.
    ///
    /// Once any location is added, the standard search list is not used.
    pub fn descriptor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor_candidates
            .get_or_insert_with(Vec::new)
            .push(expand_tilde(path.into()));
        self
    }

    /// Set the file name stem of the user settings file (default: "UserSettings")
    pub fn settings_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings_prefix = prefix.into();
        self
    }

    /// Set the file name stem of the recent-files list (default: "RecentFiles")
    pub fn mru_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mru_prefix = prefix.into();
        self
    }

    /// Initial recent-files capacity (default: 8)
    pub fn mru_capacity(mut self, capacity: usize) -> Self {
        self.mru_capacity = capacity;
        self
    }

    pub fn write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Prefix of the debug marker variable (default: upper-cased app name).
    ///
    /// With prefix `VIEWER`, setting `VIEWER_DEBUG=1` makes the process a
    /// non-production release.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Replace the environment the bootstrap reads from
    pub fn with_env_source(mut self, source: Arc<dyn EnvSource>) -> Self {
        self.env_source = source;
        self
    }

    /// Add a built-in default value.
    ///
    /// Built-in defaults are seeded first; default files and the
    /// descriptor's `[defaults]` table override them.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    /// Build the `StoreConfig`
    pub fn build(self) -> StoreConfig<S> {
        let env_prefix = self.env_prefix.unwrap_or_else(|| env_prefix_for(&self.app_name));

        StoreConfig {
            app_name: self.app_name,
            app_version: self.app_version,
            creator: self.creator,
            home_dir: self.home_dir,
            config_dir: self.config_dir,
            descriptor_candidates: self.descriptor_candidates,
            settings_prefix: self.settings_prefix,
            mru_prefix: self.mru_prefix,
            storage: self.storage,
            mru_capacity: self.mru_capacity,
            write_policy: self.write_policy,
            env_prefix,
            env_source: self.env_source,
            defaults: self.defaults,
        }
    }
}

fn expand_tilde(path: PathBuf) -> PathBuf {
    if !path.starts_with("~") {
        return path;
    }
    match dirs::home_dir() {
        Some(home) => home.join(path.strip_prefix("~").unwrap_or(Path::new(""))),
        None => path,
    }
}

/// `my-app` becomes `MY_APP`
fn env_prefix_for(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_basic() {
        let config = StoreConfig::builder("test-app", "1.0.0").build();

        assert_eq!(config.app_name, "test-app");
        assert_eq!(config.app_version, "1.0.0");
        assert_eq!(config.settings_prefix, "UserSettings");
        assert_eq!(config.mru_prefix, "RecentFiles");
        assert_eq!(config.env_prefix, "TEST_APP");
        assert_eq!(config.mru_capacity, DEFAULT_MRU_CAPACITY);
        assert_eq!(config.write_policy, WritePolicy::Deferred);
        assert!(config.descriptor_candidates.is_none());
    }

    #[test]
    fn test_builder_with_options() {
        let config = StoreConfig::builder("my-app", "2.0.0")
            .config_dir("/tmp/my-app")
            .descriptor_path("/opt/my-app/deployment.toml")
            .settings_prefix("Prefs")
            .with_env_prefix("MYAPP")
            .mru_capacity(3)
            .write_policy(WritePolicy::Immediate)
            .compact_json()
            .build();

        assert_eq!(config.config_dir, Some(PathBuf::from("/tmp/my-app")));
        assert_eq!(
            config.descriptor_candidates,
            Some(vec![PathBuf::from("/opt/my-app/deployment.toml")])
        );
        assert_eq!(config.settings_prefix, "Prefs");
        assert_eq!(config.env_prefix, "MYAPP");
        assert_eq!(config.mru_capacity, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tilde_expansion() {
        let config = StoreConfig::builder("app", "1.0").config_dir("~/cfg").build();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.config_dir, Some(home.join("cfg")));
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = StoreConfig::builder("app", "1.0").mru_capacity(0).build();
        assert!(matches!(zero.validate(), Err(Error::Config(_))));

        let bad_key = StoreConfig::builder("app", "1.0")
            .with_default("General//Theme", "x")
            .build();
        assert!(matches!(bad_key.validate(), Err(Error::InvalidKey(_))));

        let unnamed = StoreConfig::builder("  ", "1.0").build();
        assert!(unnamed.validate().is_err());
    }
}
