//! Recovery Tests
//!
//! Tests for rebuilding the store from whatever a crash left on disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use logkv::codec::Entry;
use logkv::segment::{list_dir, SegmentBuilder, SegmentId};
use logkv::{Config, Datastore, SyncStrategy};
use tempfile::TempDir;

fn setup() -> TempDir {
    TempDir::new().unwrap()
}

fn config(dir: &TempDir, max_segment_size: u64) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .max_segment_size(max_segment_size)
        .sync_strategy(SyncStrategy::EveryWrite)
        .merge_interval(None)
        .build()
}

fn open(dir: &TempDir, max_segment_size: u64) -> Datastore {
    Datastore::open(config(dir, max_segment_size)).unwrap()
}

fn segment_path(dir: &TempDir, id: SegmentId) -> PathBuf {
    dir.path().join("segments").join(id.file_name())
}

// =============================================================================
// Fresh Start
// =============================================================================

#[test]
fn test_empty_directory() {
    let dir = setup();
    let store = open(&dir, 1024);

    let report = store.recovery_report();
    assert_eq!(report.segments_loaded, 0);
    assert_eq!(report.entries_replayed, 0);
    assert_eq!(store.active_segment_id(), SegmentId::new(1, 0));
    assert_eq!(store.key_count(), 0);
}

// =============================================================================
// Torn Writes
// =============================================================================

#[test]
fn test_truncated_tail_is_discarded() {
    let dir = setup();
    let (active, full_size) = {
        let store = open(&dir, 1024 * 1024);
        store.put("a", b"first").unwrap();
        store.put("b", b"second").unwrap();
        store.put("c", b"third").unwrap();
        let active = store.active_segment_id();
        (active, store.segment(active).unwrap().size())
    };

    // Cut the last record in half
    let path = segment_path(&dir, active);
    let last_len = Entry::new("c", b"third".to_vec()).unwrap().encoded_len() as u64;
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full_size - last_len / 2).unwrap();
    drop(file);

    let store = open(&dir, 1024 * 1024);
    let report = store.recovery_report().clone();

    assert_eq!(report.entries_replayed, 2);
    assert_eq!(report.segments_truncated, 1);
    assert_eq!(report.bytes_discarded, last_len - last_len / 2);

    assert_eq!(store.get("a").unwrap(), Some(b"first".to_vec()));
    assert_eq!(store.get("b").unwrap(), Some(b"second".to_vec()));
    assert_eq!(store.get("c").unwrap(), None);

    // File cut back to the valid prefix, and appends continue from there
    assert_eq!(fs::metadata(&path).unwrap().len(), full_size - last_len);
    store.put("c", b"again").unwrap();
    drop(store);

    let store = open(&dir, 1024 * 1024);
    assert_eq!(store.recovery_report().segments_truncated, 0);
    assert_eq!(store.get("c").unwrap(), Some(b"again".to_vec()));
}

#[test]
fn test_garbage_tail_is_discarded() {
    let dir = setup();
    let active = {
        let store = open(&dir, 1024 * 1024);
        store.put("key", b"value").unwrap();
        store.active_segment_id()
    };

    let mut file = OpenOptions::new()
        .append(true)
        .open(segment_path(&dir, active))
        .unwrap();
    file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]).unwrap();
    drop(file);

    let store = open(&dir, 1024 * 1024);
    assert_eq!(store.recovery_report().segments_truncated, 1);
    assert_eq!(store.get("key").unwrap(), Some(b"value".to_vec()));
}

#[test]
fn test_corruption_in_older_segment_keeps_later_segments() {
    let dir = setup();
    let ids = {
        let store = open(&dir, 64);
        for i in 0..6 {
            store.put(&format!("k{}", i), &[b'v'; 50]).unwrap();
        }
        store.segment_ids()
    };
    assert!(ids.len() >= 3);

    // Flip a byte inside the first segment's only record
    let path = segment_path(&dir, ids[0]);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let store = open(&dir, 64);
    assert_eq!(store.recovery_report().segments_truncated, 1);
    assert_eq!(store.get("k0").unwrap(), None);
    for i in 1..6 {
        assert!(store.get(&format!("k{}", i)).unwrap().is_some());
    }
}

// =============================================================================
// Interrupted Merges
// =============================================================================

#[test]
fn test_leftover_temp_file_removed() {
    let dir = setup();
    {
        let store = open(&dir, 1024);
        store.put("a", b"1").unwrap();
    }

    // A merge that died before its rename
    let segments = dir.path().join("segments");
    let mut builder = SegmentBuilder::new(&segments, SegmentId::new(1, 1)).unwrap();
    builder.add(&Entry::new("a", b"stale".to_vec()).unwrap()).unwrap();
    std::mem::forget(builder);

    let store = open(&dir, 1024);
    assert_eq!(store.recovery_report().temp_files_removed, 1);
    assert!(list_dir(&segments).unwrap().temp_files.is_empty());
    assert_eq!(store.get("a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_segments_covered_by_merge_removed() {
    let dir = setup();
    let before = {
        let store = open(&dir, 64);
        for i in 0..4 {
            store.put(&format!("k{}", i), &[b'v'; 50]).unwrap();
        }
        store.segment_ids()
    };
    let sealed = &before[..before.len() - 1];
    assert!(sealed.len() >= 2);

    // A merge output renamed into place, but the process died before the
    // inputs were deleted
    let segments = dir.path().join("segments");
    let merged_id = sealed.last().unwrap().merged();
    let mut builder = SegmentBuilder::new(&segments, merged_id).unwrap();
    for (i, _) in sealed.iter().enumerate() {
        builder
            .add(&Entry::new(format!("k{}", i), vec![b'v'; 50]).unwrap())
            .unwrap();
    }
    builder.finish().unwrap();

    let store = open(&dir, 64);
    let report = store.recovery_report();
    assert_eq!(report.stale_segments_removed, sealed.len());
    for id in sealed {
        assert!(!segment_path(&dir, *id).exists());
    }
    assert_eq!(store.segment_ids()[0], merged_id);
    for i in 0..4 {
        assert_eq!(store.get(&format!("k{}", i)).unwrap(), Some(vec![b'v'; 50]));
    }
}

#[test]
fn test_reopen_after_rotation_starts_fresh_segment() {
    let dir = setup();
    let before = {
        let store = open(&dir, 64);
        store.put("a", &[b'x'; 60]).unwrap();
        store.segment_ids()
    };

    // The only full segment was sealed; its successor is empty and resumed
    let store = open(&dir, 64);
    assert_eq!(store.segment_ids(), before);
    assert_eq!(store.get("a").unwrap(), Some(vec![b'x'; 60]));
}
