//! Poison recovery for std locks
//!
//! A panicking subscriber must not make the store unusable, so every lock in
//! the crate is taken through these helpers.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Extension trait for `RwLock` with poison recovery
pub(crate) trait RwLockExt<T> {
    /// Acquire a read lock, recovering from poison errors
    fn read_recovered(&self) -> RwLockReadGuard<'_, T>;

    /// Acquire a write lock, recovering from poison errors
    fn write_recovered(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T> RwLockExt<T> for RwLock<T> {
    fn read_recovered(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap_or_else(|poisoned| {
            log::warn!("RwLock was poisoned (read), recovering");
            poisoned.into_inner()
        })
    }

    fn write_recovered(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap_or_else(|poisoned| {
            log::warn!("RwLock was poisoned (write), recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_recovers_poisoned_lock() {
        let lock = Arc::new(RwLock::new(1));
        let clone = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = clone.write().unwrap();
            panic!("poison it");
        })
        .join();

        assert!(lock.is_poisoned());
        *lock.write_recovered() += 1;
        assert_eq!(*lock.read_recovered(), 2);
    }
}
