//! # strata - layered application settings
//!
//! An explicitly constructed configuration store for desktop and tool
//! applications. Settings resolve across three layers, highest first:
//!
//! - **Temporary**: session values, never written to disk
//! - **User**: the user's choices, persisted per user
//! - **Default**: shipped values, from the builder, `DefaultSettings/` files
//!   and the deployment descriptor
//!
//! ## Features
//!
//! - **Hierarchical keys**: `"General/Theme"` addresses a nested value tree
//! - **Deployment bootstrap**: product identity, paths and release metadata
//!   from a TOML deployment descriptor
//! - **Persistence**: atomic writes of the User layer, deferred or immediate
//! - **Recent files**: bounded MRU registry with owner-aware pruning
//! - **Change events**: synchronous notification with subscription handles
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata::{ConfigStore, MruEntry};
//!
//! let store = ConfigStore::builder("viewer", "1.0.0")
//!     .creator("Example Labs")
//!     .with_default("General/Theme", "light")
//!     .build()?;
//!
//! if let Err(e) = store.load_settings() {
//!     // Defaults are still served; tell the user their settings were reset.
//!     eprintln!("{e}");
//! }
//!
//! store.adopt_setting("General/Theme", "dark", false)?;
//! store.add_mru_file(MruEntry::new("/data/scan-001.tif").importer("tiff"))?;
//!
//! let theme: String = store.get_or("General/Theme", String::from("light"));
//! assert_eq!(theme, "dark");
//!
//! store.application_closing()?;
//! # Ok::<(), strata::Error>(())
//! ```
//!
//! ## Precedence
//!
//! ```rust
//! use strata::{ConfigStore, LayerKind};
//! # let temp = tempfile::tempdir().unwrap();
//! # let store = ConfigStore::builder("doc", "1.0")
//! #     .home_dir(temp.path())
//! #     .config_dir(temp.path())
//! #     .descriptor_path(temp.path().join("deployment.toml"))
//! #     .with_default("General/Theme", "light")
//! #     .build()
//! #     .unwrap();
//! # let _ = store.load_settings();
//!
//! store.adopt_setting("General/Theme", "dark", false).unwrap();
//! assert_eq!(store.resolved_layer("General/Theme"), Some(LayerKind::User));
//!
//! store.delete_user_setting("General/Theme").unwrap();
//! assert_eq!(store.get::<String>("General/Theme").as_deref(), Some("light"));
//! ```
//!
//! ## Storage Backends
//!
//! - `json` (default): JSON files
//! - `toml-storage`: [`TomlStorage`]
//! - `yaml-storage`: [`YamlStorage`]

mod bootstrap;
pub mod config;
mod error;
mod events;
pub mod keys;
mod layer;
mod mru;
pub mod security;
pub mod storage;
mod store;
mod sync;
mod value;

pub use bootstrap::{
    DESCRIPTOR_FILE, DeploymentBootstrap, DeploymentDescriptor, PRODUCTION_RELEASE,
    ParsedDescriptor, ReleaseType,
};
pub use config::{DefaultEnvSource, EnvSource, StoreConfig, StoreConfigBuilder, WritePolicy};
pub use error::{Error, ErrorCategory, Result};
pub use events::{ChangeCallback, ChangeEvent, ChangeNotifier, Subscription};
pub use keys::Setting;
pub use layer::{LayerKind, PRECEDENCE, SettingsLayer};
pub use mru::{MruEntry, MruRegistry, OwnerId, OwnerLookup};
pub use storage::{JsonStorage, StorageBackend};
pub use store::{ConfigStore, ConfigStoreBuilder, DEFAULT_SETTINGS_DIR, InitState};
pub use value::{FromSettingValue, KEY_SEPARATOR, SettingValue, split_key};

#[cfg(feature = "toml-storage")]
pub use storage::TomlStorage;

#[cfg(feature = "yaml-storage")]
pub use storage::YamlStorage;
