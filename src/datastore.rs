//! Datastore Module
//!
//! The store itself: coordinates segments, the index and the merger.
//!
//! ## Responsibilities
//! - Serialize writes against the active segment and the index
//! - Serve lookups concurrently with writes and merges
//! - Rotate the active segment when it grows past its size limit
//! - Rebuild the index from disk on startup

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::codec::Entry;
use crate::config::Config;
use crate::error::{KvError, Result};
use crate::index::{Index, Location};
use crate::merge::{MergeStats, MergeWorker, Merger};
use crate::protocol::Command;
use crate::segment::{self, Segment, SegmentId, SegmentSet};

/// How many times a put chases a freshly rotated active segment
const MAX_APPEND_ATTEMPTS: usize = 3;

/// What startup recovery found on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Segments scanned into the index
    pub segments_loaded: usize,

    /// Records replayed into the index
    pub entries_replayed: u64,

    /// Segments whose corrupt tail was cut off
    pub segments_truncated: usize,

    /// Bytes dropped by those truncations
    pub bytes_discarded: u64,

    /// Segments already covered by a completed merge, deleted
    pub stale_segments_removed: usize,

    /// Unfinished merge outputs, deleted
    pub temp_files_removed: usize,
}

/// State shared between the foreground API and the merge worker
pub(crate) struct StoreState {
    pub(crate) config: Config,

    /// Directory holding the segment files
    pub(crate) segment_dir: PathBuf,

    /// Active + sealed segments
    pub(crate) segments: RwLock<SegmentSet>,

    pub(crate) index: Index,

    /// Serializes put (append + index update + rotation)
    write_lock: Mutex<()>,

    /// Next rotation sequence number
    next_seq: AtomicU64,

    /// Set after a failed append; the write path stays closed from then on
    write_failed: AtomicBool,

    /// One merge at a time
    pub(crate) merge_lock: Mutex<()>,
}

/// A log-structured key-value store
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (put): serialized by `write_lock`; append to the active
///   segment, then point the index at the returned offset
/// - **Reads** (get): resolve index entry and segment handle under the
///   segment-set read lock, then read from disk with no lock held
/// - **Merges**: background thread; only the batch snapshot and the final
///   install (segment swap + index remap) take locks
///
/// Lock order is always segment set before index.
pub struct Datastore {
    state: Arc<StoreState>,
    recovery: RecoveryReport,
    worker: Mutex<Option<MergeWorker>>,
}

impl Datastore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const SEGMENT_DIR: &'static str = "segments";

    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Create data directory
    /// 2. Recover segments and rebuild the index
    /// 3. Start the merge worker (if configured)
    /// 4. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.data_dir)?;
        let segment_dir = config.data_dir.join(Self::SEGMENT_DIR);
        fs::create_dir_all(&segment_dir)?;

        let index = Index::new();
        let (segments, next_seq, recovery) = recover(&config, &segment_dir, &index)?;

        tracing::info!(
            segments = recovery.segments_loaded,
            entries = recovery.entries_replayed,
            keys = index.len(),
            truncated = recovery.segments_truncated,
            active = %segments.active().id(),
            "Datastore recovered"
        );

        let merge_interval = config.merge_interval;
        let state = Arc::new(StoreState {
            config,
            segment_dir,
            segments: RwLock::new(segments),
            index,
            write_lock: Mutex::new(()),
            next_seq: AtomicU64::new(next_seq),
            write_failed: AtomicBool::new(false),
            merge_lock: Mutex::new(()),
        });

        let worker = match merge_interval {
            Some(interval) => Some(MergeWorker::spawn(
                Merger::new(Arc::clone(&state)),
                interval,
            )?),
            None => None,
        };

        Ok(Self {
            state,
            recovery,
            worker: Mutex::new(worker),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Execute a protocol command
    ///
    /// A GET miss is reported as `KeyNotFound` so the caller can map it to
    /// its own not-found outcome.
    pub fn execute(&self, command: Command) -> Result<Option<Vec<u8>>> {
        match command {
            Command::Get { key } => match self.get(&key)? {
                Some(value) => Ok(Some(value)),
                None => Err(KvError::KeyNotFound),
            },
            Command::Put { key, value } => {
                self.put(&key, &value)?;
                Ok(None)
            }
            Command::Ping => Ok(Some(b"PONG".to_vec())),
        }
    }

    /// Get the current value of `key`
    ///
    /// `Ok(None)` if the key was never written.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let (segment, location) = {
            let segments = self.state.segments.read();
            let location = match self.state.index.get(key) {
                Some(location) => location,
                None => return Ok(None),
            };
            let segment = segments
                .find(location.segment)
                .cloned()
                .ok_or(KvError::MissingSegment(location.segment))?;
            (segment, location)
        };

        segment.read_at(location.offset).map(Some)
    }

    /// Store `value` under `key`, replacing any previous value
    ///
    /// Once a record is appended the put succeeds. If the segment it filled
    /// then cannot be rotated, later puts fail with `WriteFailed`.
    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let entry = Entry::new(key, value)?;
        self.state.put(entry)
    }

    /// Run one merge now, on the calling thread
    ///
    /// `Ok(None)` when there are not enough sealed segments to merge.
    pub fn merge(&self) -> Result<Option<MergeStats>> {
        self.merger().run()
    }

    /// A merger bound to this store, for driving merges step by step
    pub fn merger(&self) -> Merger {
        Merger::new(Arc::clone(&self.state))
    }

    /// Force everything appended so far to disk
    pub fn sync(&self) -> Result<()> {
        let active = Arc::clone(self.state.segments.read().active());
        active.sync()
    }

    /// Close the store gracefully
    ///
    /// Stops the merge worker and syncs the active segment.
    pub fn close(self) -> Result<()> {
        self.stop_worker();
        self.sync()
    }

    fn stop_worker(&self) {
        if let Some(mut worker) = self.worker.lock().take() {
            worker.stop();
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.state.config.data_dir
    }

    /// Get the directory holding segment files
    pub fn segment_dir(&self) -> &Path {
        &self.state.segment_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Number of distinct keys
    pub fn key_count(&self) -> usize {
        self.state.index.len()
    }

    /// Number of live segments, active included
    pub fn segment_count(&self) -> usize {
        self.state.segments.read().len()
    }

    /// Ids of all live segments, oldest first, active last
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.state.segments.read().ids()
    }

    pub fn active_segment_id(&self) -> SegmentId {
        self.state.segments.read().active().id()
    }

    /// Handle to a live segment
    pub fn segment(&self, id: SegmentId) -> Option<Arc<Segment>> {
        self.state.segments.read().find(id).cloned()
    }

    /// Bytes used by all live segments
    pub fn disk_size(&self) -> u64 {
        self.state.segments.read().total_size()
    }

    /// What recovery found when this store was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }
}

impl Drop for Datastore {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

impl StoreState {
    fn put(&self, entry: Entry) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        if self.write_failed.load(Ordering::Acquire) {
            return Err(KvError::WriteFailed(
                "an earlier write failed".to_string(),
            ));
        }

        for _ in 0..MAX_APPEND_ATTEMPTS {
            let active = Arc::clone(self.segments.read().active());

            match active.append(&entry) {
                Ok(offset) => {
                    self.index
                        .put(entry.key, Location::new(active.id(), offset));

                    // The record is durable and indexed from here on. A failed
                    // rotation only closes the write path for later puts.
                    if active.size() >= self.config.max_segment_size {
                        if let Err(e) = self.rotate(&active) {
                            tracing::error!(
                                segment = %active.id(),
                                error = %e,
                                "Failed to rotate segment, rejecting further writes"
                            );
                            self.write_failed.store(true, Ordering::Release);
                        }
                    }
                    return Ok(());
                }
                Err(KvError::SegmentSealed(id)) => {
                    tracing::debug!(segment = %id, "Active segment sealed under us, retrying");
                    continue;
                }
                Err(e) => {
                    self.write_failed.store(true, Ordering::Release);
                    return Err(e);
                }
            }
        }

        self.write_failed.store(true, Ordering::Release);
        Err(KvError::WriteFailed(
            "no writable active segment".to_string(),
        ))
    }

    /// Seal `active` and install a fresh segment (write lock held)
    fn rotate(&self, active: &Arc<Segment>) -> Result<()> {
        active.seal()?;

        let id = SegmentId::new(self.next_seq.fetch_add(1, Ordering::SeqCst), 0);
        let segment = Segment::create(&self.segment_dir, id, self.config.sync_strategy)?;
        self.segments.write().rotate(Arc::new(segment));

        tracing::debug!(
            sealed = %active.id(),
            sealed_size = active.size(),
            active = %id,
            "Rotated segment"
        );
        Ok(())
    }
}

// =============================================================================
// Recovery
// =============================================================================

/// Rebuild the segment set and index from `dir`
///
/// - `.tmp` files are merges that never finished: deleted
/// - everything older than the newest merged segment was covered by that
///   merge: deleted
/// - remaining segments are replayed oldest first; a record that does not
///   decode ends its segment, and the tail from there on is truncated
fn recover(
    config: &Config,
    dir: &Path,
    index: &Index,
) -> Result<(SegmentSet, u64, RecoveryReport)> {
    let mut report = RecoveryReport::default();
    let listing = segment::list_dir(dir)?;

    for temp in &listing.temp_files {
        tracing::info!(path = %temp.display(), "Removing unfinished merge output");
        fs::remove_file(temp)?;
        report.temp_files_removed += 1;
    }

    let mut ids = listing.segments;
    if let Some(newest_merged) = ids.iter().rposition(|id| id.is_merged()) {
        for stale in ids.drain(..newest_merged) {
            tracing::info!(segment = %stale, "Removing segment already covered by a merge");
            fs::remove_file(dir.join(stale.file_name()))?;
            report.stale_segments_removed += 1;
        }
    }

    let mut segments = Vec::with_capacity(ids.len());
    for id in &ids {
        let segment = Segment::load(dir, *id)?;
        let mut records = segment.scan()?;
        let mut corruption = None;

        for item in records.by_ref() {
            match item {
                Ok((offset, entry)) => {
                    index.put(entry.key, Location::new(*id, offset));
                    report.entries_replayed += 1;
                }
                Err(KvError::CorruptRecord(reason)) => corruption = Some(reason),
                Err(e) => return Err(e),
            }
        }

        if let Some(reason) = corruption {
            let valid = records.position();
            let discarded = segment.size() - valid;
            tracing::warn!(
                segment = %id,
                valid_bytes = valid,
                discarded_bytes = discarded,
                reason = %reason,
                "Truncating corrupt segment tail"
            );
            drop(records);
            segment.truncate(valid)?;
            report.segments_truncated += 1;
            report.bytes_discarded += discarded;
        }

        segments.push(segment);
    }
    report.segments_loaded = segments.len();

    let mut next_seq = ids.last().map(|id| id.seq + 1).unwrap_or(1);

    // Keep appending to the newest segment if it is a plain, non-full one
    let active = match segments.pop() {
        Some(last) if !last.id().is_merged() && last.size() < config.max_segment_size => {
            let id = last.id();
            drop(last);
            Segment::resume(dir, id, config.sync_strategy)?
        }
        other => {
            segments.extend(other);
            let id = SegmentId::new(next_seq, 0);
            next_seq += 1;
            Segment::create(dir, id, config.sync_strategy)?
        }
    };

    let sealed = segments.into_iter().map(Arc::new).collect();
    Ok((SegmentSet::new(sealed, Arc::new(active)), next_seq, report))
}
