//! Typed setting descriptors and the keys the store itself reads

use crate::error::Result;
use crate::storage::StorageBackend;
use crate::store::ConfigStore;
use crate::value::{FromSettingValue, SettingValue};
use std::fmt;
use std::marker::PhantomData;

/// A setting key paired with the type its value is read as.
///
/// ```
/// use strata::Setting;
///
/// const ZOOM: Setting<f64> = Setting::new("View/Zoom");
/// assert_eq!(ZOOM.key(), "View/Zoom");
/// ```
pub struct Setting<T> {
    key: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> Setting<T> {
    #[must_use]
    pub const fn new(key: &'static str) -> Self {
        Self {
            key,
            _type: PhantomData,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }
}

impl<T: FromSettingValue> Setting<T> {
    /// Resolved value, or `None` when absent or of the wrong shape
    pub fn get<S: StorageBackend>(&self, store: &ConfigStore<S>) -> Option<T> {
        store.get(self.key)
    }
}

impl<T: Into<SettingValue>> Setting<T> {
    /// Write `value` to the User layer.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigStore::adopt_setting`].
    pub fn adopt<S: StorageBackend>(&self, store: &ConfigStore<S>, value: T) -> Result<bool> {
        store.adopt_setting(self.key, value, false)
    }
}

impl<T> Clone for Setting<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Setting<T> {}

impl<T> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Setting").field(&self.key).finish()
    }
}

/// Overrides the descriptor's release description when non-empty
pub const RELEASE_DESCRIPTION: Setting<String> = Setting::new("General/ReleaseDescription");

/// Capacity of the recent-files registry
pub const MRU_CAPACITY: Setting<u32> = Setting::new("FileMenu/NumberOfMruFiles");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_keys_are_valid_paths() {
        for key in [RELEASE_DESCRIPTION.key(), MRU_CAPACITY.key()] {
            assert!(crate::value::split_key(key).is_ok(), "{key}");
        }
    }

    #[test]
    fn test_debug_shows_key() {
        assert_eq!(format!("{MRU_CAPACITY:?}"), "Setting(\"FileMenu/NumberOfMruFiles\")");
    }
}
