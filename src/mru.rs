//! Most-recently-used file registry
//!
//! The registry keeps a bounded list of recently opened files, most recent
//! first. An entry may name the external object that registered it through an
//! [`OwnerId`]; the registry never owns that object. When an [`OwnerLookup`]
//! is installed, entries whose owner is gone are dropped the next time the
//! list is read.

use crate::error::{Error, Result};
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::sync::RwLockExt;
use crate::value::SettingValue;
use log::debug;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;

/// Identifier of an externally owned object (an open document, a dataset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

/// Answers whether an owner still exists.
pub trait OwnerLookup: Send + Sync {
    fn is_alive(&self, owner: OwnerId) -> bool;
}

impl<F> OwnerLookup for F
where
    F: Fn(OwnerId) -> bool + Send + Sync,
{
    fn is_alive(&self, owner: OwnerId) -> bool {
        self(owner)
    }
}

/// One recently used file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MruEntry {
    pub path: PathBuf,

    /// Name of the importer that opened the file
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub importer: String,

    /// File modification time when the entry was recorded
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub modified: Option<OffsetDateTime>,

    /// Opaque data for the importer (descriptors, options)
    #[serde(default, skip_serializing_if = "SettingValue::is_absent")]
    pub metadata: SettingValue,

    /// Object that registered the entry. Not persisted.
    #[serde(skip)]
    pub owner: Option<OwnerId>,
}

impl MruEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            importer: String::new(),
            modified: None,
            metadata: SettingValue::Absent,
            owner: None,
        }
    }

    #[must_use]
    pub fn importer(mut self, importer: impl Into<String>) -> Self {
        self.importer = importer.into();
        self
    }

    #[must_use]
    pub fn modified(mut self, modified: OffsetDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: SettingValue) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn owned_by(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }
}

fn non_zero(capacity: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(capacity)
        .ok_or_else(|| Error::Config("MRU capacity must be greater than 0".into()))
}

/// Bounded MRU list with change notification.
pub struct MruRegistry {
    entries: RwLock<LruCache<PathBuf, MruEntry>>,
    owners: RwLock<Option<Arc<dyn OwnerLookup>>>,
    notifier: Arc<ChangeNotifier>,
}

impl MruRegistry {
    /// Create an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `capacity` is 0.
    pub fn new(capacity: usize, notifier: Arc<ChangeNotifier>) -> Result<Self> {
        Ok(Self {
            entries: RwLock::new(LruCache::new(non_zero(capacity)?)),
            owners: RwLock::new(None),
            notifier,
        })
    }

    /// Install the lookup used to detect destroyed owners.
    pub fn set_owner_lookup(&self, lookup: Arc<dyn OwnerLookup>) {
        *self.owners.write_recovered() = Some(lookup);
    }

    /// Insert `entry` at the front, or move an existing entry for the same
    /// path to the front. Evicts the least recently used entry when full.
    pub fn add(&self, entry: MruEntry) {
        let path = entry.path.clone();
        let displaced = self.entries.write_recovered().push(path.clone(), entry);

        debug!("MRU file added: {}", path.display());
        self.notifier.publish(&ChangeEvent::MruFileAdded { path: path.clone() });

        if let Some((evicted, _)) = displaced.filter(|(key, _)| *key != path) {
            debug!("MRU file evicted: {}", evicted.display());
            self.notifier
                .publish(&ChangeEvent::MruFileRemoved { path: evicted });
        }
    }

    /// Remove the entry for `path`. Returns whether it was present.
    pub fn remove(&self, path: &Path) -> bool {
        let removed = self.entries.write_recovered().pop(path).is_some();
        if removed {
            self.notifier.publish(&ChangeEvent::MruFileRemoved {
                path: path.to_path_buf(),
            });
        }
        removed
    }

    /// Remove every entry registered by `owner`. Returns how many were removed.
    pub fn remove_owned_by(&self, owner: OwnerId) -> usize {
        let removed = self.remove_where(|entry| entry.owner == Some(owner));
        removed.len()
    }

    /// Entries, most recent first, without those whose owner is gone.
    pub fn list(&self) -> Vec<MruEntry> {
        self.prune();
        self.entries
            .read_recovered()
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Look up `path` without changing its position.
    pub fn find(&self, path: &Path) -> Option<MruEntry> {
        let entry = self.entries.read_recovered().peek(path).cloned()?;
        if self.owner_alive(&entry) {
            Some(entry)
        } else {
            self.remove(path);
            None
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read_recovered().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.read_recovered().cap().get()
    }

    /// Change the capacity, evicting the oldest entries that no longer fit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `capacity` is 0.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        let cap = non_zero(capacity)?;
        let evicted: Vec<PathBuf> = {
            let mut entries = self.entries.write_recovered();
            let overflow = entries
                .iter()
                .skip(capacity)
                .map(|(path, _)| path.clone())
                .collect();
            entries.resize(cap);
            overflow
        };
        for path in evicted {
            self.notifier.publish(&ChangeEvent::MruFileRemoved { path });
        }
        Ok(())
    }

    /// Replace the contents with `entries` (most recent first) without
    /// publishing. Used when restoring from disk.
    pub(crate) fn replace_all(&self, entries: Vec<MruEntry>) {
        let mut cache = self.entries.write_recovered();
        cache.clear();
        for entry in entries.into_iter().rev() {
            cache.push(entry.path.clone(), entry);
        }
    }

    /// Entries, most recent first, including ones with dead owners.
    pub(crate) fn snapshot(&self) -> Vec<MruEntry> {
        self.entries
            .read_recovered()
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    fn owner_alive(&self, entry: &MruEntry) -> bool {
        let Some(owner) = entry.owner else {
            return true;
        };
        let lookup = self.owners.read_recovered().clone();
        lookup.is_none_or(|lookup| lookup.is_alive(owner))
    }

    fn prune(&self) {
        let removed = self.remove_where(|entry| !self.owner_alive(entry));
        for path in &removed {
            debug!("MRU file pruned, owner gone: {}", path.display());
        }
    }

    /// The predicate runs with no lock held, so an owner lookup may call
    /// back into the registry.
    fn remove_where(&self, predicate: impl Fn(&MruEntry) -> bool) -> Vec<PathBuf> {
        let doomed: Vec<PathBuf> = self
            .snapshot()
            .into_iter()
            .filter(|entry| predicate(entry))
            .map(|entry| entry.path)
            .collect();
        if doomed.is_empty() {
            return doomed;
        }

        let removed: Vec<PathBuf> = {
            let mut entries = self.entries.write_recovered();
            doomed
                .into_iter()
                .filter(|path| entries.pop(path).is_some())
                .collect()
        };
        for path in &removed {
            self.notifier
                .publish(&ChangeEvent::MruFileRemoved { path: path.clone() });
        }
        removed
    }
}
