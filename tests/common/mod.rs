//! Common test utilities for strata integration tests
//!
//! Provides a temporary deployment (descriptor, home and user config
//! directories) and helpers to build stores on top of it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use strata::{ChangeEvent, ConfigStore, ConfigStoreBuilder, EnvSource, JsonStorage};
use tempfile::TempDir;

/// User name every fixture store runs as
pub const TEST_USER: &str = "tester";

/// Descriptor written by [`TestFixture::new`]
pub const DESCRIPTOR: &str = r#"
creator = "Example Labs"
product = "Viewer"
version = "4.2.0"
release-type = "normal"
release-date = "2024-05-01"
release-description = "Spring release"
build-revision = "r1234"
home-path = "home"
user-config-path = "config"

[defaults.General]
Theme = "light"
Language = "en"
"#;

// =============================================================================
// Test Fixtures
// =============================================================================

/// Temporary deployment plus a loaded store
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub store: ConfigStore,
}

impl TestFixture {
    /// Deployment with [`DESCRIPTOR`], loaded
    pub fn new() -> Self {
        Self::with_descriptor(DESCRIPTOR)
    }

    /// Deployment with a custom descriptor, loaded
    pub fn with_descriptor(descriptor: &str) -> Self {
        let fixture = Self::unloaded(Some(descriptor));
        fixture
            .store
            .load_settings()
            .expect("Failed to load settings");
        fixture
    }

    /// Deployment whose store has not been loaded yet
    pub fn unloaded(descriptor: Option<&str>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("home")).expect("Failed to create home");
        if let Some(content) = descriptor {
            std::fs::write(temp_dir.path().join("deployment.toml"), content)
                .expect("Failed to write descriptor");
        }
        let store = builder(temp_dir.path())
            .build()
            .expect("Failed to create store");
        Self { temp_dir, store }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn home(&self) -> PathBuf {
        self.root().join("home")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join("config")
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.root().join("deployment.toml")
    }

    /// Path of the user settings file for [`TEST_USER`]
    pub fn user_file(&self) -> PathBuf {
        self.config_dir()
            .join(format!("UserSettings-{TEST_USER}.json"))
    }

    /// Path of the recent-files list for [`TEST_USER`]
    pub fn mru_file(&self) -> PathBuf {
        self.config_dir().join(format!("RecentFiles-{TEST_USER}.json"))
    }

    /// A second store on the same deployment, loaded
    pub fn reopen(&self) -> ConfigStore {
        let store = builder(self.root())
            .build()
            .expect("Failed to create store");
        store.load_settings().expect("Failed to reload settings");
        store
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Route `log` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fixed environment: runs as [`TEST_USER`] with no debug marker
pub fn test_env() -> Arc<dyn EnvSource> {
    Arc::new(HashMap::from([("USER".to_string(), TEST_USER.to_string())]))
}

/// Store builder for a deployment rooted at `root`
pub fn builder(root: &Path) -> ConfigStoreBuilder<JsonStorage> {
    init_logging();
    ConfigStore::builder("viewer", "0.0.1")
        .descriptor_path(root.join("deployment.toml"))
        .home_dir(root.join("home"))
        .config_dir(root.join("config"))
        .with_env_source(test_env())
}

/// Write a JSON default settings file into `<home>/DefaultSettings`
pub fn write_default_file(home: &Path, name: &str, json: &str) {
    let dir = home.join("DefaultSettings");
    std::fs::create_dir_all(&dir).expect("Failed to create DefaultSettings");
    std::fs::write(dir.join(name), json).expect("Failed to write default file");
}

/// Count every event the store publishes
pub fn count_events(store: &ConfigStore) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    store.events().subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    counter
}

/// Record every event the store publishes
pub fn record_events(store: &ConfigStore) -> Arc<Mutex<Vec<ChangeEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    store.events().subscribe(move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    log
}
