//! Merge Tests
//!
//! Tests for collapsing sealed segments and for the races between a merge
//! and foreground writes.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use logkv::segment::{list_dir, SegmentId};
use logkv::{Config, Datastore, KvError, SyncStrategy};
use tempfile::TempDir;

fn setup() -> TempDir {
    TempDir::new().unwrap()
}

/// Segments so small that every put rotates
fn config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .max_segment_size(16)
        .sync_strategy(SyncStrategy::EveryWrite)
        .merge_interval(None)
        .merge_min_segments(2)
        .build()
}

fn open(dir: &TempDir) -> Datastore {
    Datastore::open(config(dir)).unwrap()
}

// =============================================================================
// Basic Merge
// =============================================================================

#[test]
fn test_merge_keeps_latest_value_per_key() {
    let dir = setup();
    let store = open(&dir);

    store.put("a", b"1").unwrap();
    store.put("b", b"1").unwrap();
    store.put("a", b"2").unwrap();
    assert_eq!(store.segment_count(), 4);

    let stats = store.merge().unwrap().unwrap();
    assert_eq!(
        stats.inputs,
        vec![
            SegmentId::new(1, 0),
            SegmentId::new(2, 0),
            SegmentId::new(3, 0)
        ]
    );
    assert_eq!(stats.output, SegmentId::new(3, 1));
    assert_eq!(stats.records_scanned, 3);
    assert_eq!(stats.records_written, 2);
    assert_eq!(stats.keys_remapped, 2);
    assert_eq!(stats.keys_skipped, 0);
    assert!(stats.bytes_after < stats.bytes_before);

    assert_eq!(store.get("a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(store.get("b").unwrap(), Some(b"1".to_vec()));

    // One record per key in the merged segment
    let merged = store.segment(stats.output).unwrap();
    let keys: Vec<String> = merged
        .scan()
        .unwrap()
        .map(|r| r.unwrap().1.key)
        .collect();
    assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
}

#[test]
fn test_merge_removes_input_files() {
    let dir = setup();
    let store = open(&dir);

    store.put("a", b"1").unwrap();
    store.put("a", b"2").unwrap();
    let stats = store.merge().unwrap().unwrap();

    let on_disk = list_dir(store.segment_dir()).unwrap().segments;
    for input in &stats.inputs {
        assert!(!on_disk.contains(input), "{} still on disk", input);
    }
    assert!(on_disk.contains(&stats.output));
    assert_eq!(store.segment_ids(), on_disk);
}

#[test]
fn test_nothing_to_merge() {
    let dir = setup();
    let store = open(&dir);
    assert!(store.merge().unwrap().is_none());

    // One sealed segment is below the minimum of two
    store.put("a", b"1").unwrap();
    assert!(store.merge().unwrap().is_none());
}

#[test]
fn test_repeated_merges_fold_previous_output() {
    let dir = setup();
    let store = open(&dir);

    store.put("a", b"1").unwrap();
    store.put("b", b"1").unwrap();
    let first = store.merge().unwrap().unwrap();

    store.put("a", b"2").unwrap();
    store.put("c", b"1").unwrap();
    let second = store.merge().unwrap().unwrap();

    assert_eq!(second.inputs[0], first.output);
    assert_eq!(second.output.generation, 1);
    assert_eq!(store.segment_count(), 2);

    assert_eq!(store.get("a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(store.get("b").unwrap(), Some(b"1".to_vec()));
    assert_eq!(store.get("c").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_lone_merged_segment_not_remerged() {
    let dir = setup();
    let store = Datastore::open(
        Config::builder()
            .data_dir(dir.path())
            .max_segment_size(16)
            .merge_interval(None)
            .merge_min_segments(1)
            .merge_max_batch(4)
            .build(),
    )
    .unwrap();

    store.put("a", b"1").unwrap();
    store.put("a", b"2").unwrap();
    assert!(store.merge().unwrap().is_some());
    assert!(store.merge().unwrap().is_none());
}

// =============================================================================
// Races With Foreground Writes
// =============================================================================

#[test]
fn test_put_during_merge_wins() {
    let dir = setup();
    let store = open(&dir);

    store.put("a", b"1").unwrap();
    store.put("b", b"1").unwrap();
    store.put("a", b"2").unwrap();

    let merger = store.merger();
    let pending = merger.prepare().unwrap().unwrap();
    assert_eq!(pending.records_written(), 2);

    // Lands in the active segment while the merge output already holds a=2
    store.put("a", b"3").unwrap();

    let stats = merger.commit(pending).unwrap();
    assert_eq!(stats.keys_remapped, 1);
    assert_eq!(stats.keys_skipped, 1);

    assert_eq!(store.get("a").unwrap(), Some(b"3".to_vec()));
    assert_eq!(store.get("b").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_stale_batch_aborts() {
    let dir = setup();
    let store = open(&dir);

    store.put("a", b"1").unwrap();
    store.put("b", b"1").unwrap();

    let merger = store.merger();
    let stale = merger.prepare().unwrap().unwrap();
    let stale_output = stale.output();
    assert_eq!(stale_output, SegmentId::new(2, 1));

    store.put("c", b"1").unwrap();
    let fresh = merger.prepare().unwrap().unwrap();
    assert_eq!(fresh.inputs().len(), 3);
    merger.commit(fresh).unwrap();

    let result = merger.commit(stale);
    assert!(matches!(result, Err(KvError::MergeAborted(_))));

    let on_disk = list_dir(store.segment_dir()).unwrap().segments;
    assert!(!on_disk.contains(&stale_output));
    for key in ["a", "b", "c"] {
        assert_eq!(store.get(key).unwrap(), Some(b"1".to_vec()));
    }
}

#[test]
fn test_abandoned_merge_leaves_store_untouched() {
    let dir = setup();
    let store = open(&dir);

    store.put("a", b"1").unwrap();
    store.put("a", b"2").unwrap();
    let before = store.segment_ids();

    let pending = store.merger().prepare().unwrap().unwrap();
    let output = pending.output();
    pending.abort();

    assert_eq!(store.segment_ids(), before);
    assert!(!list_dir(store.segment_dir()).unwrap().segments.contains(&output));
    assert_eq!(store.get("a").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_held_segment_readable_after_merge() {
    let dir = setup();
    let store = open(&dir);

    store.put("a", b"1").unwrap();
    store.put("b", b"2").unwrap();

    let first = store.segment(SegmentId::new(1, 0)).unwrap();
    store.merge().unwrap().unwrap();

    // Replaced, but still readable through an outstanding handle
    assert_eq!(first.read_at(0).unwrap(), b"1");
    let path = first.path().to_path_buf();
    assert!(path.exists());

    drop(first);
    assert!(!path.exists());
}

#[test]
fn test_concurrent_reads_during_merges() {
    let dir = setup();
    let store = std::sync::Arc::new(open(&dir));

    for i in 0..20 {
        store.put(&format!("k{}", i % 5), format!("v{}", i).as_bytes()).unwrap();
    }

    let reader = {
        let store = std::sync::Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..200 {
                for k in 0..5 {
                    let value = store.get(&format!("k{}", k)).unwrap();
                    assert!(value.is_some());
                }
            }
        })
    };

    for i in 20..40 {
        store.put(&format!("k{}", i % 5), format!("v{}", i).as_bytes()).unwrap();
        if i % 4 == 0 {
            store.merge().unwrap();
        }
    }
    reader.join().unwrap();

    for k in 0..5 {
        assert_eq!(
            store.get(&format!("k{}", k)).unwrap(),
            Some(format!("v{}", 35 + k).into_bytes())
        );
    }
}

#[test]
fn test_merge_rebuilds_over_failed_attempt_residue() {
    let dir = setup();
    let store = Datastore::open(
        Config::builder()
            .data_dir(dir.path())
            .max_segment_size(16)
            .sync_strategy(SyncStrategy::EveryWrite)
            .merge_interval(None)
            .merge_min_segments(2)
            .merge_max_batch(2)
            .build(),
    )
    .unwrap();

    for i in 0..4 {
        store.put(&format!("k{}", i), b"v").unwrap();
    }

    // What an interrupted build of the next output leaves behind
    let output = SegmentId::new(2, 0).merged();
    let residue = store.segment_dir().join(output.temp_file_name());
    fs::write(&residue, b"half a merge").unwrap();

    store.put("k4", b"v").unwrap();
    let stats = store.merge().unwrap().unwrap();

    assert_eq!(stats.output, output);
    assert!(!residue.exists());
    assert!(list_dir(store.segment_dir()).unwrap().temp_files.is_empty());
    for i in 0..5 {
        assert_eq!(store.get(&format!("k{}", i)).unwrap(), Some(b"v".to_vec()));
    }

    // And the store keeps merging afterwards
    assert!(store.merge().unwrap().is_some());
}

// =============================================================================
// Persistence and Background Worker
// =============================================================================

#[test]
fn test_merged_store_reopens() {
    let dir = setup();
    let output = {
        let store = open(&dir);
        store.put("a", b"1").unwrap();
        store.put("b", b"1").unwrap();
        store.put("a", b"2").unwrap();
        store.merge().unwrap().unwrap().output
    };

    let store = open(&dir);
    assert_eq!(store.segment_ids()[0], output);
    assert_eq!(store.recovery_report().stale_segments_removed, 0);
    assert_eq!(store.recovery_report().entries_replayed, 2);
    assert_eq!(store.get("a").unwrap(), Some(b"2".to_vec()));
    assert_eq!(store.get("b").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_background_worker_merges() {
    let dir = setup();
    let store = Datastore::open(
        Config::builder()
            .data_dir(dir.path())
            .max_segment_size(16)
            .merge_interval(Some(Duration::from_millis(20)))
            .merge_min_segments(2)
            .build(),
    )
    .unwrap();

    for i in 0..6 {
        store.put("key", format!("v{}", i).as_bytes()).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while store.segment_ids().iter().all(|id| !id.is_merged()) {
        assert!(Instant::now() < deadline, "worker never merged");
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(store.get("key").unwrap(), Some(b"v5".to_vec()));
    store.close().unwrap();
}
