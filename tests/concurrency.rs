//! # Concurrency Tests
//!
//! An engine is shared across threads behind an `Arc`. Inserts serialize
//! on the engine's write lock while fetches run under the read lock; every
//! reader must observe a consistent, sorted view.

use emberdb::{BlockInfoIndex, Engine, Event};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const WRITERS: u64 = 4;
const EVENTS_PER_WRITER: i64 = 150;

#[test]
fn concurrent_writers_and_readers_stay_consistent() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(
        Engine::builder()
            .block_size(1024)
            .create(dir.path().join("shared.edb"))
            .unwrap(),
    );
    let barrier = Arc::new(Barrier::new(WRITERS as usize + 2));

    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for ts in 0..EVENTS_PER_WRITER {
                let event = Event::new(writer % 2, ts, writer as u32 + 1).with_property(1, "w".repeat(24));
                engine.insert_event(&event).unwrap();
            }
        }));
    }

    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..50 {
                for object_id in 0..2 {
                    let stamps: Vec<i64> = engine
                        .fetch_events(object_id)
                        .unwrap()
                        .map(|e| e.unwrap().timestamp)
                        .collect();
                    assert!(
                        stamps.windows(2).all(|w| w[0] <= w[1]),
                        "readers SHOULD only see sorted events"
                    );
                }
                BlockInfoIndex::from_blocks(engine.block_infos().unwrap()).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    for object_id in 0..2 {
        let count = engine.fetch_events(object_id).unwrap().count() as i64;
        assert_eq!(count, EVENTS_PER_WRITER * 2);
    }
}

#[test]
fn concurrent_symbol_creation_never_duplicates() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(Engine::create(dir.path().join("symbols.edb")).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..50)
                    .map(|i| engine.find_or_create_action(&format!("action-{}", i)).unwrap())
                    .collect::<Vec<u32>>()
            })
        })
        .collect();

    let results: Vec<Vec<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for ids in &results[1..] {
        assert_eq!(ids, &results[0], "every thread SHOULD see the same ids");
    }
    let mut unique = results[0].clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 50);
}

#[test]
fn lookups_while_iterating_do_not_wait_for_queued_writers() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(Engine::create(dir.path().join("reentrant.edb")).unwrap());
    let login = engine.find_or_create_action("login").unwrap();
    engine.insert_event(&Event::new(5, 100, login)).unwrap();

    let (ready_tx, ready_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let (name_tx, name_rx) = mpsc::channel();

    let reader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let mut events = engine.fetch_events(5).unwrap();
            ready_tx.send(()).unwrap();
            go_rx.recv().unwrap();

            let first = events.next().unwrap().unwrap();
            let name = engine.action_name(first.action_id).unwrap();
            name_tx.send(name).unwrap();
            drop(events);
        })
    };

    ready_rx.recv().unwrap();
    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.insert_event(&Event::new(5, 200, login)).unwrap())
    };
    // Give the writer time to park on the lock behind the open iterator.
    thread::sleep(Duration::from_millis(100));
    go_tx.send(()).unwrap();

    let name = name_rx
        .recv_timeout(Duration::from_secs(3))
        .expect("lookup under an open iterator SHOULD not block behind a queued writer");
    assert_eq!(name, "login");

    reader.join().unwrap();
    writer.join().unwrap();
    assert_eq!(engine.fetch_events(5).unwrap().count(), 2);
}
