use crate::bootstrap::ParsedDescriptor;
use crate::error::{Error, Result};
use crate::events::ChangeEvent;
use crate::layer::{LayerKind, SettingsLayer};
use crate::mru::MruEntry;
use crate::security;
use crate::storage::StorageBackend;
use crate::sync::RwLockExt;
use crate::value::SettingValue;

use super::{ConfigStore, InitState};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

/// Directory under the home path holding shipped default files
pub const DEFAULT_SETTINGS_DIR: &str = "DefaultSettings";

/// On-disk shape of the recent-files list
#[derive(Serialize, Deserialize, Default)]
struct RecentFiles {
    #[serde(default)]
    files: Vec<MruEntry>,
}

impl<S: StorageBackend> ConfigStore<S> {
    // -------------------------------------------------------------------------
    // Loading
    // -------------------------------------------------------------------------

    /// Bootstrap the store and load every layer from disk.
    ///
    /// In order: locate and parse the deployment descriptor, build the
    /// Default layer (built-in defaults, `<home>/DefaultSettings/*`, the
    /// additional defaults directory, the descriptor's `[defaults]` table),
    /// read the user file into the User layer, then restore the MRU list.
    ///
    /// A missing or malformed descriptor, or an unreadable default file,
    /// leaves the store [`InitState::InitializedWithWarning`]. The Temporary
    /// layer is kept.
    ///
    /// On a reload, unsaved user and MRU changes are written first. If that
    /// write fails the reload is abandoned and the in-memory state is kept.
    ///
    /// # Errors
    ///
    /// - [`Error::Initialization`] if no usable home directory exists; the
    ///   store is then [`InitState::Failed`] and serves built-in defaults.
    /// - [`Error::UserSettings`] if the user file exists but cannot be read.
    ///   The store is still initialized and serves the Default layer.
    /// - The write error if pending changes could not be saved before a
    ///   reload.
    pub fn load_settings(&self) -> Result<()> {
        if self.is_initialized() {
            self.flush().inspect_err(|e| {
                warn!("Reload abandoned, pending changes could not be written: {e}");
            })?;
        }

        {
            let mut state = self.state.write_recovered();
            if *state == InitState::Bootstrapping {
                return Err(Error::Initialization(
                    "load_settings is already running".into(),
                ));
            }
            *state = InitState::Bootstrapping;
        }

        let parsed = self.config.bootstrap().run();
        let mut warnings: Vec<String> = parsed.error.iter().cloned().collect();

        if let Err(reason) = parsed.descriptor.validate() {
            warn!("Bootstrap failed: {reason}");
            self.set_state(InitState::Failed(reason.clone()));
            return Err(Error::Initialization(reason));
        }

        *self.debug_trace.write_recovered() = parsed.debug_trace.clone();
        if self.identity.set(parsed.descriptor.clone()).is_err() {
            debug!("Identity already resolved, keeping the first bootstrap's");
        }

        let defaults = self.build_default_layer(&parsed, &mut warnings);

        let user_path = self.user_settings_path();
        let (user, user_error) = match self.read_user_layer(&user_path) {
            Ok(layer) => (layer, None),
            Err(e) => {
                warn!("{e}");
                warnings.push(e.to_string());
                (SettingsLayer::new(), Some(e))
            }
        };

        {
            let mut layers = self.layers.write_recovered();
            layers.default = defaults;
            layers.user = user;
        }
        self.dirty.store(false, Ordering::Release);

        self.sync_mru_capacity();
        self.load_mru();

        let state = if warnings.is_empty() {
            InitState::Initialized
        } else {
            InitState::InitializedWithWarning(warnings.join("; "))
        };
        self.set_state(state);

        info!(
            "Settings loaded for {} {} from {}",
            self.product(),
            self.version(),
            self.user_config_path().display()
        );
        self.events.publish(&ChangeEvent::SettingsLoaded);

        user_error.map_or(Ok(()), Err)
    }

    fn build_default_layer(
        &self,
        parsed: &ParsedDescriptor,
        warnings: &mut Vec<String>,
    ) -> SettingsLayer {
        let mut layer = SettingsLayer::new();
        for (key, value) in &self.config.defaults {
            if let Err(e) = layer.set(key, value.clone(), false) {
                warn!("Skipping built-in default: {e}");
            }
        }

        let mut sources = vec![parsed.descriptor.home_path.join(DEFAULT_SETTINGS_DIR)];
        sources.extend(parsed.descriptor.additional_defaults_path.clone());

        for dir in sources {
            for file in self.default_files(&dir) {
                match self.storage.read::<SettingValue>(&file) {
                    Ok(tree) if tree.is_map() => {
                        debug!("Merging default settings from {}", file.display());
                        layer.merge(tree);
                    }
                    Ok(tree) => warnings.push(format!(
                        "default settings file '{}' holds a {}, expected a map",
                        file.display(),
                        tree.type_name()
                    )),
                    Err(e) => {
                        warn!("Skipping default settings file: {e}");
                        warnings.push(format!(
                            "default settings file '{}' unreadable: {e}",
                            file.display()
                        ));
                    }
                }
            }
        }

        layer.merge(parsed.defaults.clone());
        layer
    }

    /// Files in `dir` with this backend's extension, sorted by name.
    fn default_files(&self, dir: &Path) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No default settings in {}", dir.display());
                return Vec::new();
            }
            Err(e) => {
                let err = Error::DirectoryRead {
                    path: dir.to_path_buf(),
                    source: e,
                };
                warn!("Skipping default settings: {err}");
                return Vec::new();
            }
        };

        let ext = self.storage.extension();
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && path.extension().and_then(|x| x.to_str()) == Some(ext)
            })
            .collect();
        files.sort();
        files
    }

    fn read_user_layer(&self, path: &Path) -> Result<SettingsLayer> {
        if !path.exists() {
            debug!("No user settings at {}, starting empty", path.display());
            return Ok(SettingsLayer::new());
        }

        let corrupt = |reason: String| Error::UserSettings {
            path: path.to_path_buf(),
            reason,
        };
        let tree: SettingValue = self
            .storage
            .read(path)
            .map_err(|e| corrupt(e.to_string()))?;
        SettingsLayer::from_value(tree).map_err(|e| corrupt(e.to_string()))
    }

    fn load_mru(&self) {
        let path = self.mru_path();
        let entries = if path.exists() {
            match self.storage.read::<RecentFiles>(&path) {
                Ok(recent) => {
                    debug!("Restored {} recent files", recent.files.len());
                    recent.files
                }
                Err(e) => {
                    warn!("Ignoring unreadable recent-files list: {e}");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        self.mru.replace_all(entries);
        self.mru_dirty.store(false, Ordering::Release);
    }

    // -------------------------------------------------------------------------
    // File names
    // -------------------------------------------------------------------------

    /// `<prefix>-<user>.<ext>`
    #[must_use]
    pub fn user_storage_file_name(&self, prefix: &str, ext: &str) -> String {
        format!("{prefix}-{}.{ext}", self.user_name())
    }

    /// [`user_storage_file_name`](Self::user_storage_file_name) inside the
    /// user config directory
    #[must_use]
    pub fn user_storage_file_path(&self, prefix: &str, ext: &str) -> PathBuf {
        self.user_config_path()
            .join(self.user_storage_file_name(prefix, ext))
    }

    /// Path of the per-user settings file
    #[must_use]
    pub fn user_settings_path(&self) -> PathBuf {
        self.user_storage_file_path(&self.config.settings_prefix, self.storage.extension())
    }

    /// Path of the per-user recent-files list
    #[must_use]
    pub fn mru_path(&self) -> PathBuf {
        self.user_storage_file_path(&self.config.mru_prefix, self.storage.extension())
    }

    // -------------------------------------------------------------------------
    // Writing
    // -------------------------------------------------------------------------

    /// Write one layer to `path`.
    pub(crate) fn serialize_settings(&self, path: &Path, layer: LayerKind) -> Result<()> {
        let snapshot = self.layers.read_recovered().layer(layer).root().clone();
        self.write_private(path, &snapshot)
    }

    /// Write `tree` to `path` in the store's format, so it can be shipped as a
    /// default settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written. An existing file is
    /// left intact on failure.
    pub fn serialize_as_defaults(&self, path: &Path, tree: &SettingValue) -> Result<()> {
        self.storage.write(path, tree)?;
        info!("Wrote default settings to {}", path.display());
        Ok(())
    }

    /// Read a value tree from `path`; `None` if it is missing or malformed.
    #[must_use]
    pub fn deserialize(&self, path: &Path) -> Option<SettingValue> {
        match self.storage.read(path) {
            Ok(tree) => Some(tree),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!("Could not deserialize {}: {e}", path.display());
                None
            }
        }
    }

    /// Write the User layer and the MRU list now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] before a successful load, or the
    /// underlying I/O error. The previous files stay intact on failure.
    pub fn save_settings(&self) -> Result<()> {
        self.ensure_writable()?;
        self.flush_user()?;
        self.flush_mru()?;
        info!("Settings saved to {}", self.user_config_path().display());
        Ok(())
    }

    /// Announce that the application is closing, then flush.
    ///
    /// Listeners run before anything is written, so they can still adopt
    /// final values.
    ///
    /// # Errors
    ///
    /// Returns the flush error, if any.
    pub fn application_closing(&self) -> Result<()> {
        self.events.publish(&ChangeEvent::ApplicationClosing);
        self.shutdown()
    }

    /// Flush pending changes. Does nothing when uninitialized or clean.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub fn shutdown(&self) -> Result<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        self.flush()
    }

    /// Write whatever is dirty.
    pub(crate) fn flush(&self) -> Result<()> {
        if self.dirty.load(Ordering::Acquire) {
            self.flush_user()?;
        }
        if self.mru_dirty.load(Ordering::Acquire) {
            self.flush_mru()?;
        }
        Ok(())
    }

    pub(crate) fn flush_user(&self) -> Result<()> {
        self.dirty.store(false, Ordering::Release);
        let path = self.user_settings_path();
        self.serialize_settings(&path, LayerKind::User)
            .inspect_err(|_| self.dirty.store(true, Ordering::Release))?;
        debug!("User settings written to {}", path.display());
        Ok(())
    }

    pub(crate) fn flush_mru(&self) -> Result<()> {
        self.mru_dirty.store(false, Ordering::Release);
        let recent = RecentFiles {
            files: self.mru.snapshot(),
        };
        self.write_private(&self.mru_path(), &recent)
            .inspect_err(|_| self.mru_dirty.store(true, Ordering::Release))
    }

    fn write_private<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        if let Some(dir) = path.parent() {
            security::ensure_private_dir(dir)?;
        }
        self.storage.write(path, data)?;
        security::set_private_file_permissions(path)
    }
}
