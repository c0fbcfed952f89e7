//! Recent Files Integration Tests
//!
//! - Bound and eviction order
//! - Persistence through the user config directory
//! - Owner-aware pruning
//! - Capacity driven by `FileMenu/NumberOfMruFiles`

mod common;

use common::{DESCRIPTOR, TestFixture, builder, record_events};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use strata::{ChangeEvent, Error, MruEntry, OwnerId, SettingValue, keys};
use time::OffsetDateTime;

fn paths(entries: &[MruEntry]) -> Vec<PathBuf> {
    entries.iter().map(|e| e.path.clone()).collect()
}

#[test]
fn test_most_recent_first_and_bounded() {
    let fixture = TestFixture::new();
    let store = &fixture.store;

    for i in 0..12 {
        store
            .add_mru_file(MruEntry::new(format!("/data/file{i}.tif")))
            .unwrap();
    }

    let files = store.mru_files();
    assert_eq!(files.len(), 8);
    assert_eq!(files[0].path, Path::new("/data/file11.tif"));
    assert_eq!(files[7].path, Path::new("/data/file4.tif"));
    assert!(store.mru_file(Path::new("/data/file3.tif")).is_none());
}

#[test]
fn test_eviction_publishes_removed() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(temp.path().join("home")).unwrap();
    std::fs::write(temp.path().join("deployment.toml"), DESCRIPTOR).unwrap();
    let store = builder(temp.path()).mru_capacity(2).build().unwrap();
    store.load_settings().unwrap();
    let log = record_events(&store);

    for name in ["a", "b", "c"] {
        store.add_mru_file(MruEntry::new(format!("/{name}"))).unwrap();
    }

    let events = log.lock().unwrap().clone();
    assert!(events.contains(&ChangeEvent::MruFileRemoved {
        path: PathBuf::from("/a")
    }));
    assert_eq!(paths(&store.mru_files()), vec![PathBuf::from("/c"), PathBuf::from("/b")]);
}

#[test]
fn test_re_adding_moves_to_front() {
    let fixture = TestFixture::new();
    let store = &fixture.store;

    for name in ["/a", "/b", "/c"] {
        store.add_mru_file(MruEntry::new(name)).unwrap();
    }
    store
        .add_mru_file(MruEntry::new("/a").importer("png"))
        .unwrap();

    let files = store.mru_files();
    assert_eq!(
        paths(&files),
        vec![PathBuf::from("/a"), PathBuf::from("/c"), PathBuf::from("/b")]
    );
    assert_eq!(files[0].importer, "png");
}

#[test]
fn test_find_does_not_promote() {
    let fixture = TestFixture::new();
    let store = &fixture.store;

    store.add_mru_file(MruEntry::new("/a")).unwrap();
    store.add_mru_file(MruEntry::new("/b")).unwrap();

    assert!(store.mru_file(Path::new("/a")).is_some());
    assert_eq!(store.mru_files()[0].path, Path::new("/b"));
}

#[test]
fn test_remove_mru_file() {
    let fixture = TestFixture::new();
    let store = &fixture.store;

    store.add_mru_file(MruEntry::new("/a")).unwrap();
    assert!(store.remove_mru_file(Path::new("/a")).unwrap());
    assert!(!store.remove_mru_file(Path::new("/a")).unwrap());
    assert!(store.mru_files().is_empty());
}

#[test]
fn test_mru_writes_rejected_before_load() {
    let fixture = TestFixture::unloaded(Some(DESCRIPTOR));
    assert!(matches!(
        fixture.store.add_mru_file(MruEntry::new("/a")),
        Err(Error::NotInitialized)
    ));
}

#[test]
fn test_mru_survives_reload() {
    let fixture = TestFixture::new();
    let modified = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    let metadata: SettingValue = [("Channels", 3)].into_iter().collect();

    fixture.store.add_mru_file(MruEntry::new("/old.tif")).unwrap();
    fixture
        .store
        .add_mru_file(
            MruEntry::new("/new.tif")
                .importer("tiff")
                .modified(modified)
                .metadata(metadata.clone())
                .owned_by(OwnerId(42)),
        )
        .unwrap();
    fixture.store.shutdown().unwrap();
    assert!(fixture.mru_file().exists());

    let reopened = fixture.reopen();
    let files = reopened.mru_files();

    assert_eq!(paths(&files), vec![PathBuf::from("/new.tif"), PathBuf::from("/old.tif")]);
    assert_eq!(files[0].importer, "tiff");
    assert_eq!(files[0].modified, Some(modified));
    assert_eq!(files[0].metadata, metadata);
    assert_eq!(files[0].owner, None);
}

#[test]
fn test_unreadable_mru_file_is_ignored() {
    let fixture = TestFixture::unloaded(Some(DESCRIPTOR));
    std::fs::create_dir_all(fixture.config_dir()).unwrap();
    std::fs::write(fixture.mru_file(), "garbage").unwrap();

    fixture.store.load_settings().unwrap();
    assert!(fixture.store.mru_files().is_empty());
}

#[test]
fn test_entries_of_destroyed_owners_are_pruned() {
    let fixture = TestFixture::new();
    let store = &fixture.store;
    let alive: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new([1, 2].into_iter().collect()));
    let lookup = Arc::clone(&alive);
    store.set_owner_lookup(Arc::new(move |owner: OwnerId| {
        lookup.lock().unwrap().contains(&owner.0)
    }));

    store.add_mru_file(MruEntry::new("/one").owned_by(OwnerId(1))).unwrap();
    store.add_mru_file(MruEntry::new("/two").owned_by(OwnerId(2))).unwrap();
    store.add_mru_file(MruEntry::new("/free")).unwrap();
    assert_eq!(store.mru_files().len(), 3);

    alive.lock().unwrap().remove(&1);
    assert_eq!(
        paths(&store.mru_files()),
        vec![PathBuf::from("/free"), PathBuf::from("/two")]
    );

    alive.lock().unwrap().remove(&2);
    assert!(store.mru_file(Path::new("/two")).is_none());
    assert_eq!(store.mru_files().len(), 1);
}

#[test]
fn test_capacity_follows_setting() {
    let fixture = TestFixture::new();
    let store = &fixture.store;

    for i in 0..6 {
        store.add_mru_file(MruEntry::new(format!("/f{i}"))).unwrap();
    }

    keys::MRU_CAPACITY.adopt(store, 3).unwrap();
    assert_eq!(store.mru().capacity(), 3);
    assert_eq!(
        paths(&store.mru_files()),
        vec![PathBuf::from("/f5"), PathBuf::from("/f4"), PathBuf::from("/f3")]
    );

    store.delete_user_setting(keys::MRU_CAPACITY.key()).unwrap();
    assert_eq!(store.mru().capacity(), 8);

    // Zero is not a usable capacity; the configured one stays.
    keys::MRU_CAPACITY.adopt(store, 0).unwrap();
    assert_eq!(store.mru().capacity(), 8);
}

#[test]
fn test_capacity_setting_applies_on_load() {
    let descriptor = format!("{DESCRIPTOR}\n[defaults.FileMenu]\nNumberOfMruFiles = 2\n");
    let fixture = TestFixture::with_descriptor(&descriptor);
    assert_eq!(fixture.store.mru().capacity(), 2);
}
