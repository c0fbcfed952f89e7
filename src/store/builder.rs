//! Builder for ConfigStore
//!
//! [`ConfigStoreBuilder`] wraps a [`StoreConfigBuilder`] and produces a
//! [`ConfigStore`](super::ConfigStore) in one chain of calls.

use crate::config::{EnvSource, StoreConfigBuilder, WritePolicy};
use crate::error::Result;
use crate::storage::{JsonStorage, StorageBackend};
use crate::value::SettingValue;
use std::path::PathBuf;
use std::sync::Arc;

use super::ConfigStore;

/// Builder for creating a [`ConfigStore`] with a fluent API.
///
/// # Example
///
/// ```rust,no_run
/// use strata::{ConfigStore, WritePolicy};
///
/// let store = ConfigStore::builder("viewer", "1.0.0")
///     .creator("Example Labs")
///     .descriptor_path("/opt/viewer/deployment.toml")
///     .write_policy(WritePolicy::Immediate)
///     .with_default("FileMenu/NumberOfMruFiles", 10)
///     .build()
///     .unwrap();
/// ```
pub struct ConfigStoreBuilder<S: StorageBackend = JsonStorage> {
    config_builder: StoreConfigBuilder<S>,
}

impl ConfigStoreBuilder<JsonStorage> {
    /// Create a new builder with required app name and version.
    pub fn new(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            config_builder: StoreConfigBuilder::new(app_name, app_version),
        }
    }

    /// Use compact JSON (no pretty printing).
    pub fn compact_json(mut self) -> Self {
        self.config_builder = self.config_builder.compact_json();
        self
    }
}

impl<S: StorageBackend> ConfigStoreBuilder<S> {
    /// Use a different storage backend for the user and MRU files.
    pub fn with_storage<T: StorageBackend>(self, storage: T) -> ConfigStoreBuilder<T> {
        ConfigStoreBuilder {
            config_builder: self.config_builder.with_storage(storage),
        }
    }

    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.creator(creator);
        self
    }

    /// Home directory used when the descriptor has no `home-path`.
    ///
    /// Supports `~` expansion for home directory.
    pub fn home_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_builder = self.config_builder.home_dir(path);
        self
    }

    /// User configuration directory used when the descriptor has no
    /// `user-config-path`.
    ///
    /// Supports `~` expansion for home directory.
    pub fn config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_builder = self.config_builder.config_dir(path);
        self
    }

    /// Add an explicit descriptor location, replacing the standard search.
    pub fn descriptor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_builder = self.config_builder.descriptor_path(path);
        self
    }

    pub fn settings_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.settings_prefix(prefix);
        self
    }

    pub fn mru_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.mru_prefix(prefix);
        self
    }

    pub fn mru_capacity(mut self, capacity: usize) -> Self {
        self.config_builder = self.config_builder.mru_capacity(capacity);
        self
    }

    pub fn write_policy(mut self, policy: WritePolicy) -> Self {
        self.config_builder = self.config_builder.write_policy(policy);
        self
    }

    /// Prefix of the `{PREFIX}_DEBUG` marker variable.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.with_env_prefix(prefix);
        self
    }

    pub fn with_env_source(mut self, source: Arc<dyn EnvSource>) -> Self {
        self.config_builder = self.config_builder.with_env_source(source);
        self
    }

    /// Add a built-in default value.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.config_builder = self.config_builder.with_default(key, value);
        self
    }

    /// Build the [`ConfigStore`].
    ///
    /// The store is not loaded yet; call
    /// [`load_settings`](ConfigStore::load_settings) next.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> Result<ConfigStore<S>> {
        ConfigStore::new(self.config_builder.build())
    }
}
