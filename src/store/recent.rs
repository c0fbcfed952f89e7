use crate::config::WritePolicy;
use crate::error::Result;
use crate::mru::{MruEntry, OwnerLookup};
use crate::storage::StorageBackend;

use super::ConfigStore;

use log::warn;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl<S: StorageBackend> ConfigStore<S> {
    /// Record a recently used file, moving it to the front if already listed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`](crate::Error::NotInitialized) before
    /// a successful load.
    pub fn add_mru_file(&self, entry: MruEntry) -> Result<()> {
        self.ensure_writable()?;
        self.mru.add(entry);
        self.mru_changed();
        Ok(())
    }

    /// Forget a recently used file. Returns whether it was listed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`](crate::Error::NotInitialized) before
    /// a successful load.
    pub fn remove_mru_file(&self, path: &Path) -> Result<bool> {
        self.ensure_writable()?;
        let removed = self.mru.remove(path);
        if removed {
            self.mru_changed();
        }
        Ok(removed)
    }

    /// Recent files, most recent first
    #[must_use]
    pub fn mru_files(&self) -> Vec<MruEntry> {
        self.mru.list()
    }

    /// Entry for `path`, without promoting it
    #[must_use]
    pub fn mru_file(&self, path: &Path) -> Option<MruEntry> {
        self.mru.find(path)
    }

    /// Install the lookup that decides whether an entry's owner still exists
    pub fn set_owner_lookup(&self, lookup: Arc<dyn OwnerLookup>) {
        self.mru.set_owner_lookup(lookup);
    }

    fn mru_changed(&self) {
        self.mru_dirty.store(true, Ordering::Release);
        if self.config.write_policy == WritePolicy::Immediate {
            if let Err(e) = self.flush_mru() {
                warn!("Immediate write of recent files failed, will retry on shutdown: {e}");
            }
        }
    }
}
