//! The layered configuration store
//!
//! [`ConfigStore`] owns the Temporary, User and Default layers, the
//! recent-files registry, the change notifier and the process identity. It is
//! built explicitly by the application entry point, populated with
//! [`ConfigStore::load_settings`], shared by reference (or `Arc`) with the
//! rest of the program, and flushed with [`ConfigStore::shutdown`].

mod builder;
mod io;
mod operations;
mod recent;

pub use builder::ConfigStoreBuilder;
pub use io::DEFAULT_SETTINGS_DIR;

use crate::bootstrap::{DeploymentDescriptor, ReleaseType};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::events::ChangeNotifier;
use crate::keys;
use crate::layer::LayerStack;
use crate::mru::MruRegistry;
use crate::storage::{JsonStorage, StorageBackend};
use crate::sync::RwLockExt;

use log::{info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use time::Date;

/// Where the store is in its startup sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitState {
    #[default]
    Uninitialized,
    /// `load_settings` is running
    Bootstrapping,
    Initialized,
    /// Usable, but something was missing or unreadable
    InitializedWithWarning(String),
    /// Bootstrap could not produce a usable environment; only the built-in
    /// defaults are served and writes are rejected
    Failed(String),
}

impl InitState {
    /// `true` for both initialized states
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(
            self,
            InitState::Initialized | InitState::InitializedWithWarning(_)
        )
    }

    /// Warning or failure message, if any
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            InitState::InitializedWithWarning(msg) | InitState::Failed(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Application-wide layered settings store.
///
/// Lookups walk [`PRECEDENCE`](crate::PRECEDENCE): a Temporary value hides a
/// User value, which hides a Default value. Runtime writes go to the User
/// layer (persisted) or the Temporary layer (session only).
///
/// # Example
///
/// ```rust,no_run
/// use strata::ConfigStore;
///
/// let store = ConfigStore::builder("viewer", "1.0.0")
///     .with_default("General/Theme", "light")
///     .build()?;
/// store.load_settings()?;
///
/// store.adopt_setting("General/Theme", "dark", false)?;
/// assert_eq!(store.get::<String>("General/Theme").as_deref(), Some("dark"));
///
/// store.shutdown()?;
/// # Ok::<(), strata::Error>(())
/// ```
pub struct ConfigStore<S: StorageBackend = JsonStorage> {
    pub(crate) config: StoreConfig<S>,

    pub(crate) storage: S,

    /// Temporary, User and Default layers
    pub(crate) layers: RwLock<LayerStack>,

    pub(crate) state: RwLock<InitState>,

    /// Identity from the first successful bootstrap
    pub(crate) identity: OnceLock<DeploymentDescriptor>,

    /// Identity served before bootstrap, or after it failed
    pub(crate) builtin_identity: DeploymentDescriptor,

    pub(crate) debug_trace: RwLock<Vec<String>>,

    pub(crate) events: Arc<ChangeNotifier>,

    pub(crate) mru: MruRegistry,

    /// User layer differs from the user file
    pub(crate) dirty: AtomicBool,

    /// MRU registry differs from the MRU file
    pub(crate) mru_dirty: AtomicBool,
}

impl ConfigStore<JsonStorage> {
    /// Create a builder for a JSON-backed store.
    pub fn builder(
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> ConfigStoreBuilder<JsonStorage> {
        ConfigStoreBuilder::new(app_name, app_version)
    }
}

impl<S: StorageBackend> ConfigStore<S> {
    /// Create a store from `config`.
    ///
    /// The store starts [`InitState::Uninitialized`] with only the built-in
    /// defaults in its Default layer. Nothing is read from disk until
    /// [`load_settings`](Self::load_settings).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: StoreConfig<S>) -> Result<Self> {
        config.validate()?;

        let storage = config.storage.clone();
        let builtin_identity = config.bootstrap().builtin();
        let events = Arc::new(ChangeNotifier::new());
        let mru = MruRegistry::new(config.mru_capacity, Arc::clone(&events))?;

        let mut layers = LayerStack::default();
        for (key, value) in &config.defaults {
            layers.default.set(key, value.clone(), false)?;
        }

        info!(
            "Created configuration store for {} {}",
            config.app_name, config.app_version
        );

        Ok(Self {
            config,
            storage,
            layers: RwLock::new(layers),
            state: RwLock::new(InitState::Uninitialized),
            identity: OnceLock::new(),
            builtin_identity,
            debug_trace: RwLock::new(Vec::new()),
            events,
            mru,
            dirty: AtomicBool::new(false),
            mru_dirty: AtomicBool::new(false),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &StoreConfig<S> {
        &self.config
    }

    /// Get the storage backend
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Change notifier for registering listeners
    ///
    /// # Example
    ///
    /// ```
    /// # use strata::{ChangeEvent, ConfigStore};
    /// # let temp = tempfile::tempdir().unwrap();
    /// # let store = ConfigStore::builder("test", "1.0")
    /// #     .home_dir(temp.path())
    /// #     .config_dir(temp.path())
    /// #     .descriptor_path(temp.path().join("none.toml"))
    /// #     .build()
    /// #     .unwrap();
    /// store.events().watch("General/Theme", |event| {
    ///     if let ChangeEvent::SettingModified { layer, .. } = event {
    ///         println!("theme changed in {layer}");
    ///     }
    /// });
    /// ```
    pub fn events(&self) -> &Arc<ChangeNotifier> {
        &self.events
    }

    /// Recent-files registry
    pub fn mru(&self) -> &MruRegistry {
        &self.mru
    }

    // -------------------------------------------------------------------------
    // Initialization state
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn init_state(&self) -> InitState {
        self.state.read_recovered().clone()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.read_recovered().is_initialized()
    }

    /// Message recorded by the last bootstrap, if it was not clean
    #[must_use]
    pub fn initialization_error_msg(&self) -> Option<String> {
        self.state.read_recovered().message().map(str::to_string)
    }

    /// Notes the descriptor parser produced (ignored keys, defaulted fields)
    #[must_use]
    pub fn debug_trace(&self) -> Vec<String> {
        self.debug_trace.read_recovered().clone()
    }

    pub(crate) fn set_state(&self, state: InitState) {
        *self.state.write_recovered() = state;
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    /// Resolved deployment identity.
    ///
    /// Before the first successful bootstrap this is the built-in identity
    /// from the builder.
    pub fn descriptor(&self) -> &DeploymentDescriptor {
        self.identity.get().unwrap_or(&self.builtin_identity)
    }

    pub fn creator(&self) -> &str {
        &self.descriptor().creator
    }

    pub fn product(&self) -> &str {
        &self.descriptor().product
    }

    pub fn version(&self) -> &str {
        &self.descriptor().version
    }

    pub fn build_revision(&self) -> &str {
        &self.descriptor().build_revision
    }

    pub fn release_type(&self) -> ReleaseType {
        self.descriptor().release_type
    }

    pub fn release_date(&self) -> Option<Date> {
        self.descriptor().release_date
    }

    /// Release description.
    ///
    /// A non-empty `General/ReleaseDescription` setting wins over the
    /// descriptor's `release-description`.
    pub fn release_description(&self) -> String {
        keys::RELEASE_DESCRIPTION
            .get(self)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| self.descriptor().release_description.clone())
    }

    pub fn is_production_release(&self) -> bool {
        self.descriptor().is_production_release()
    }

    pub fn home_path(&self) -> &Path {
        &self.descriptor().home_path
    }

    pub fn plugin_path(&self) -> &Path {
        &self.descriptor().plugin_path
    }

    pub fn user_docs(&self) -> &Path {
        &self.descriptor().user_docs
    }

    pub fn user_config_path(&self) -> &Path {
        &self.descriptor().user_config_path
    }

    pub fn additional_defaults_path(&self) -> Option<&Path> {
        self.descriptor().additional_defaults_path.as_deref()
    }

    pub fn user_name(&self) -> &str {
        &self.descriptor().user_name
    }

    pub fn os_name(&self) -> &str {
        &self.descriptor().os_name
    }

    pub fn architecture(&self) -> &str {
        &self.descriptor().architecture
    }
}

impl<S: StorageBackend> Drop for ConfigStore<S> {
    fn drop(&mut self) {
        if !self.is_initialized() {
            return;
        }
        if self.dirty.load(Ordering::Acquire) || self.mru_dirty.load(Ordering::Acquire) {
            if let Err(e) = self.flush() {
                warn!("Failed to write settings while dropping the store: {e}");
            }
        }
    }
}
