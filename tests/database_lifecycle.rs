//! # Database Lifecycle Tests
//!
//! A `Database` is bound to a root directory and hands out one shared
//! engine per named store. These tests cover create/destroy, store reuse
//! across database handles and pass-through of engine errors.

use emberdb::{Database, EngineBuilder, Event, StorageError};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn create_destroy_keeps_path() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("sky").join("data");

    let db = Database::create(&root).unwrap();
    assert_eq!(db.path(), root.as_path(), "database SHOULD remember its root");

    db.close().unwrap();
    drop(db);
    assert!(root.is_dir());
}

#[test]
fn stores_persist_across_database_handles() {
    let dir = tempdir().unwrap();

    {
        let db = Database::create(dir.path()).unwrap();
        let users = db.open_store("users").unwrap();
        let login = users.find_or_create_action("login").unwrap();
        users.insert_event(&Event::new(5, 100, login)).unwrap();
        users.insert_event(&Event::new(5, 200, login)).unwrap();
    }

    let db = Database::create(dir.path()).unwrap();
    let users = db.open_store("users").unwrap();
    let stamps: Vec<i64> = users.fetch_events(5).unwrap().map(|e| e.unwrap().timestamp).collect();
    assert_eq!(stamps, vec![100, 200]);
    assert_eq!(users.action_id("login").unwrap(), 1);
}

#[test]
fn create_store_replaces_existing_file() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path()).unwrap();

    let first = db.open_store("events").unwrap();
    first.insert_event(&Event::new(1, 1, 1)).unwrap();

    let fresh = db.create_store("events").unwrap();

    assert!(!Arc::ptr_eq(&first, &fresh));
    assert!(!first.is_open(), "the replaced engine SHOULD be closed");
    assert_eq!(fresh.fetch_events(1).unwrap().count(), 0);
}

#[test]
fn closing_a_store_surfaces_engine_errors_unchanged() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path()).unwrap();
    let store = db
        .open_store_with("tiny", EngineBuilder::new().block_size(512))
        .unwrap();

    let err = store
        .insert_event(&Event::new(1, 1, 1).with_property(1, "x".repeat(300)))
        .unwrap_err();
    assert!(matches!(StorageError::of(&err), Some(StorageError::EventTooLarge { .. })));

    db.close_store("tiny").unwrap();
    let err = store.fetch_events(1).err().unwrap();
    assert!(matches!(StorageError::of(&err), Some(StorageError::NotOpen)));
    assert!(db.get_store("tiny").is_none());
}
