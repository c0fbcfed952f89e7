//! Change notification
//!
//! [`ChangeNotifier`] is a synchronous publish/subscribe channel. The store
//! publishes after every accepted mutation; delivery happens on the calling
//! thread. Callbacks are cloned out of the listener lists before they run, so
//! a subscriber may read or mutate the store, subscribe, or unsubscribe from
//! inside its own callback.

use crate::layer::LayerKind;
use crate::sync::RwLockExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Something that changed in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A setting was written into `layer`
    SettingModified { key: String, layer: LayerKind },
    /// A setting was removed from `layer`
    SettingDeleted { key: String, layer: LayerKind },
    /// `load_settings` finished and the layers were replaced
    SettingsLoaded,
    /// A file was added to (or moved to the front of) the MRU registry
    MruFileAdded { path: PathBuf },
    /// A file left the MRU registry (removed, evicted or pruned)
    MruFileRemoved { path: PathBuf },
    /// The application announced it is closing
    ApplicationClosing,
}

impl ChangeEvent {
    /// Setting key carried by the event, if any
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            ChangeEvent::SettingModified { key, .. } | ChangeEvent::SettingDeleted { key, .. } => {
                Some(key)
            }
            _ => None,
        }
    }
}

/// Type alias for a change callback
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Handle returned by [`ChangeNotifier::subscribe`] and
/// [`ChangeNotifier::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Publish/subscribe channel for store mutations
pub struct ChangeNotifier {
    next_id: AtomicU64,

    /// Called for every event
    global_listeners: RwLock<Vec<(Subscription, ChangeCallback)>>,

    /// Called only for setting events on one key
    key_listeners: RwLock<HashMap<String, Vec<(Subscription, ChangeCallback)>>>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            global_listeners: RwLock::new(Vec::new()),
            key_listeners: RwLock::new(HashMap::new()),
        }
    }

    fn next_subscription(&self) -> Subscription {
        Subscription(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a listener for every event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let subscription = self.next_subscription();
        self.global_listeners
            .write_recovered()
            .push((subscription, Arc::new(callback)));
        subscription
    }

    /// Register a listener for setting events on one key.
    ///
    /// # Example
    ///
    /// ```
    /// use strata::{ChangeEvent, ChangeNotifier};
    ///
    /// let notifier = ChangeNotifier::new();
    /// notifier.watch("ui/theme", |event| {
    ///     if let ChangeEvent::SettingModified { layer, .. } = event {
    ///         println!("theme changed in the {layer} layer");
    ///     }
    /// });
    /// ```
    pub fn watch<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let subscription = self.next_subscription();
        self.key_listeners
            .write_recovered()
            .entry(key.to_string())
            .or_default()
            .push((subscription, Arc::new(callback)));
        subscription
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        {
            let mut global = self.global_listeners.write_recovered();
            if let Some(pos) = global.iter().position(|(id, _)| *id == subscription) {
                global.remove(pos);
                return true;
            }
        }

        let mut keyed = self.key_listeners.write_recovered();
        let mut found = false;
        keyed.retain(|_, listeners| {
            if let Some(pos) = listeners.iter().position(|(id, _)| *id == subscription) {
                listeners.remove(pos);
                found = true;
            }
            !listeners.is_empty()
        });
        found
    }

    /// Deliver `event` to every matching listener, in registration order.
    pub(crate) fn publish(&self, event: &ChangeEvent) {
        let mut callbacks: Vec<ChangeCallback> = self
            .global_listeners
            .read_recovered()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        if let Some(key) = event.key() {
            if let Some(listeners) = self.key_listeners.read_recovered().get(key) {
                callbacks.extend(listeners.iter().map(|(_, cb)| Arc::clone(cb)));
            }
        }

        // No lock is held past this point.
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of registered listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.global_listeners.read_recovered().len()
            + self
                .key_listeners
                .read_recovered()
                .values()
                .map(Vec::len)
                .sum::<usize>()
    }

    /// Clear all listeners
    pub fn clear(&self) {
        self.global_listeners.write_recovered().clear();
        self.key_listeners.write_recovered().clear();
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
