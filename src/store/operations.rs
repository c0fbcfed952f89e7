use crate::config::WritePolicy;
use crate::error::{Error, Result};
use crate::events::ChangeEvent;
use crate::keys;
use crate::layer::LayerKind;
use crate::storage::StorageBackend;
use crate::sync::RwLockExt;
use crate::value::{FromSettingValue, KEY_SEPARATOR, SettingValue};

use super::ConfigStore;

use log::{debug, warn};
use std::sync::atomic::Ordering;

impl<S: StorageBackend> ConfigStore<S> {
    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Resolve `key` across the layers.
    ///
    /// Returns [`SettingValue::Absent`] when no layer defines the key or the
    /// key is not a valid path.
    #[must_use]
    pub fn get_setting(&self, key: &str) -> SettingValue {
        self.layers
            .read_recovered()
            .resolve(key)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    }

    /// Resolve `key` and convert it to `T`.
    ///
    /// A value of the wrong shape is treated as absent.
    #[must_use]
    pub fn get<T: FromSettingValue>(&self, key: &str) -> Option<T> {
        let layers = self.layers.read_recovered();
        let (layer, value) = layers.resolve(key)?;
        let typed = value.extract::<T>();
        if typed.is_none() && !value.is_absent() {
            debug!(
                "Setting {key} in {layer} layer is a {}, expected {}",
                value.type_name(),
                T::EXPECTED
            );
        }
        typed
    }

    /// Like [`get`](Self::get), with a fallback.
    #[must_use]
    pub fn get_or<T: FromSettingValue>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Layer the resolved value of `key` comes from
    #[must_use]
    pub fn resolved_layer(&self, key: &str) -> Option<LayerKind> {
        self.layers.read_recovered().resolve(key).map(|(kind, _)| kind)
    }

    #[must_use]
    pub fn is_user_setting(&self, key: &str) -> bool {
        self.layers.read_recovered().user.contains(key)
    }

    #[must_use]
    pub fn is_temporary_setting(&self, key: &str) -> bool {
        self.layers.read_recovered().temporary.contains(key)
    }

    #[must_use]
    pub fn is_default_setting(&self, key: &str) -> bool {
        self.layers.read_recovered().default.contains(key)
    }

    /// Deep-merge the resolved value of `key` into `target` at the same path.
    ///
    /// Returns `false` (and leaves `target` alone) when `key` resolves to
    /// nothing.
    pub fn copy_setting(&self, key: &str, target: &mut SettingValue) -> bool {
        let value = self.get_setting(key);
        if value.is_absent() {
            return false;
        }

        let mut branch = SettingValue::map();
        if branch.set_path(key, value).is_err() {
            return false;
        }
        if !target.is_map() {
            *target = SettingValue::map();
        }
        target.merge(branch);
        true
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Store `value` for `key` in the User layer.
    ///
    /// With `set_if_same == false` an equal stored value is left alone. Returns
    /// whether the layer changed; listeners are notified only then. Adopting
    /// [`SettingValue::Absent`] deletes the user value.
    ///
    /// Infinite and NaN floats are rejected with
    /// [`Error::MalformedValue`](crate::Error::MalformedValue); settings files
    /// cannot hold them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`](crate::Error::NotInitialized) before
    /// a successful [`load_settings`](Self::load_settings) and
    /// [`Error::InvalidKey`](crate::Error::InvalidKey) for a malformed key.
    pub fn adopt_setting(
        &self,
        key: &str,
        value: impl Into<SettingValue>,
        set_if_same: bool,
    ) -> Result<bool> {
        self.ensure_writable()?;
        let value = value.into();
        if value.is_absent() {
            return self.delete_user_setting(key);
        }
        if !value.is_storable() {
            return Err(Error::MalformedValue {
                key: key.to_string(),
                expected: "finite numbers".into(),
            });
        }

        let changed = self
            .layers
            .write_recovered()
            .user
            .set(key, value, !set_if_same)?;

        if !changed {
            debug!("Setting {key} unchanged, skipping write");
            return Ok(false);
        }

        debug!("Adopted user setting {key}");
        self.user_layer_changed(key);
        self.events.publish(&ChangeEvent::SettingModified {
            key: key.to_string(),
            layer: LayerKind::User,
        });
        Ok(true)
    }

    /// Store `value` for `key` in the Temporary layer. Never persisted.
    ///
    /// # Errors
    ///
    /// Same as [`adopt_setting`](Self::adopt_setting).
    pub fn set_temporary_setting(&self, key: &str, value: impl Into<SettingValue>) -> Result<bool> {
        self.ensure_writable()?;
        let value = value.into();
        if value.is_absent() {
            return self.delete_temporary_setting(key);
        }

        let changed = self
            .layers
            .write_recovered()
            .temporary
            .set(key, value, true)?;

        if changed {
            debug!("Set temporary setting {key}");
            self.sync_dependent(key);
            self.events.publish(&ChangeEvent::SettingModified {
                key: key.to_string(),
                layer: LayerKind::Temporary,
            });
        }
        Ok(changed)
    }

    /// Remove `key` from the User layer; lower layers show through again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`](crate::Error::NotInitialized) before
    /// a successful load.
    pub fn delete_user_setting(&self, key: &str) -> Result<bool> {
        self.ensure_writable()?;
        let removed = self.layers.write_recovered().user.remove(key);
        if removed {
            debug!("Deleted user setting {key}");
            self.user_layer_changed(key);
            self.events.publish(&ChangeEvent::SettingDeleted {
                key: key.to_string(),
                layer: LayerKind::User,
            });
        }
        Ok(removed)
    }

    /// Remove `key` from the Temporary layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`](crate::Error::NotInitialized) before
    /// a successful load.
    pub fn delete_temporary_setting(&self, key: &str) -> Result<bool> {
        self.ensure_writable()?;
        let removed = self.layers.write_recovered().temporary.remove(key);
        if removed {
            debug!("Deleted temporary setting {key}");
            self.sync_dependent(key);
            self.events.publish(&ChangeEvent::SettingDeleted {
                key: key.to_string(),
                layer: LayerKind::Temporary,
            });
        }
        Ok(removed)
    }

    /// Bookkeeping after the User layer changed: dirty flag, dependent
    /// state, and the eager write under [`WritePolicy::Immediate`].
    fn user_layer_changed(&self, key: &str) {
        self.dirty.store(true, Ordering::Release);
        self.sync_dependent(key);

        if self.config.write_policy == WritePolicy::Immediate {
            if let Err(e) = self.flush_user() {
                warn!("Immediate write of user settings failed, will retry on shutdown: {e}");
            }
        }
    }

    fn sync_dependent(&self, key: &str) {
        let capacity_key = keys::MRU_CAPACITY.key();
        let covers = capacity_key
            .strip_prefix(key)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(KEY_SEPARATOR));
        if covers {
            self.sync_mru_capacity();
        }
    }

    /// Resize the MRU registry to the `FileMenu/NumberOfMruFiles` setting,
    /// or the configured capacity when the setting is unusable.
    pub(crate) fn sync_mru_capacity(&self) {
        let capacity = keys::MRU_CAPACITY
            .get(self)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(self.config.mru_capacity);

        if capacity != self.mru.capacity() {
            match self.mru.set_capacity(capacity) {
                Ok(()) => {
                    debug!("MRU capacity set to {capacity}");
                    self.mru_dirty.store(true, Ordering::Release);
                }
                Err(e) => warn!("Could not resize MRU registry: {e}"),
            }
        }
    }
}
