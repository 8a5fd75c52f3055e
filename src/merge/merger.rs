//! Merger
//!
//! Collapses the oldest sealed segments into one, keeping the newest record
//! of each key.

use std::collections::HashMap;
use std::sync::Arc;

use crate::datastore::StoreState;
use crate::error::Result;
use crate::index::{Location, Remap};
use crate::segment::{Segment, SegmentBuilder, SegmentId};

/// Summary of one completed merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStats {
    /// Segments folded into the output, oldest first
    pub inputs: Vec<SegmentId>,
    pub output: SegmentId,
    pub records_scanned: u64,
    pub records_written: u64,
    /// Keys the index now resolves through the output
    pub keys_remapped: usize,
    /// Keys rewritten by a put while the merge ran
    pub keys_skipped: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// A merge whose output is durable but not yet installed
pub struct PendingMerge {
    batch: Vec<Arc<Segment>>,
    output: Arc<Segment>,
    remaps: Vec<Remap>,
    records_scanned: u64,
    committed: bool,
}

impl PendingMerge {
    /// Ids of the segments being replaced
    pub fn inputs(&self) -> Vec<SegmentId> {
        self.batch.iter().map(|segment| segment.id()).collect()
    }

    pub fn output(&self) -> SegmentId {
        self.output.id()
    }

    /// Number of records copied into the output
    pub fn records_written(&self) -> usize {
        self.remaps.len()
    }

    /// Give up and delete the output
    ///
    /// Dropping an uncommitted merge does the same.
    pub fn abort(self) {}
}

impl Drop for PendingMerge {
    fn drop(&mut self) {
        if !self.committed {
            self.output.mark_obsolete();
        }
    }
}

/// Runs merges against a store
///
/// Obtained from `Datastore::merger()`, or owned by the background worker.
#[derive(Clone)]
pub struct Merger {
    state: Arc<StoreState>,
}

impl Merger {
    pub(crate) fn new(state: Arc<StoreState>) -> Self {
        Self { state }
    }

    /// Prepare and commit one merge, if one is due
    pub fn run(&self) -> Result<Option<MergeStats>> {
        let _merge_guard = self.state.merge_lock.lock();

        match self.prepare_batch()? {
            Some(pending) => self.commit(pending).map(Some),
            None => Ok(None),
        }
    }

    /// Write the merged segment for the current oldest batch
    ///
    /// Returns `None` if fewer than `merge_min_segments` segments are
    /// sealed. The returned merge has not touched the index or the segment
    /// set yet; pass it to `commit`.
    ///
    /// Preparations never overlap, so a failed one leaves nothing behind
    /// that stops the next from rebuilding the same output.
    pub fn prepare(&self) -> Result<Option<PendingMerge>> {
        let _merge_guard = self.state.merge_lock.lock();
        self.prepare_batch()
    }

    /// `prepare` body; caller holds `merge_lock`
    fn prepare_batch(&self) -> Result<Option<PendingMerge>> {
        let config = &self.state.config;
        let batch = {
            let segments = self.state.segments.read();
            if segments.sealed().len() < config.merge_min_segments {
                return Ok(None);
            }
            segments.oldest(config.merge_max_batch)
        };

        let output_id = match batch.last() {
            // Re-merging a lone merged segment cannot shrink it
            Some(last) if batch.len() == 1 && last.id().is_merged() => return Ok(None),
            Some(last) => last.id().merged(),
            None => return Ok(None),
        };

        // Pass 1: last location of every key in the batch
        let mut latest: HashMap<String, Location> = HashMap::new();
        let mut records_scanned = 0u64;
        for segment in &batch {
            for item in segment.scan()? {
                let (offset, entry) = item?;
                records_scanned += 1;
                latest.insert(entry.key, Location::new(segment.id(), offset));
            }
        }

        // Pass 2: copy those records in write order
        let mut builder = SegmentBuilder::new(&self.state.segment_dir, output_id)?;
        let mut remaps = Vec::with_capacity(latest.len());
        if let Err(e) = copy_latest(&batch, &latest, &mut builder, &mut remaps) {
            builder.abandon();
            return Err(e);
        }

        let output = builder.finish()?;
        tracing::debug!(
            output = %output_id,
            inputs = batch.len(),
            records = remaps.len(),
            "Merge output written"
        );

        Ok(Some(PendingMerge {
            batch,
            output: Arc::new(output),
            remaps,
            records_scanned,
            committed: false,
        }))
    }

    /// Install a prepared merge
    ///
    /// Fails with `MergeAborted` (and deletes the output) if the batch is no
    /// longer the oldest run of sealed segments.
    pub fn commit(&self, mut pending: PendingMerge) -> Result<MergeStats> {
        let inputs = pending.inputs();

        let (removed, keys_remapped) = {
            let mut segments = self.state.segments.write();
            let removed = segments.replace_prefix(&inputs, Arc::clone(&pending.output))?;
            pending.committed = true;
            let keys_remapped = self.state.index.remap(&pending.remaps);
            (removed, keys_remapped)
        };

        for segment in &removed {
            segment.mark_obsolete();
        }

        let stats = MergeStats {
            bytes_before: removed.iter().map(|segment| segment.size()).sum(),
            bytes_after: pending.output.size(),
            inputs,
            output: pending.output.id(),
            records_scanned: pending.records_scanned,
            records_written: pending.remaps.len() as u64,
            keys_remapped,
            keys_skipped: pending.remaps.len() - keys_remapped,
        };

        tracing::info!(
            inputs = stats.inputs.len(),
            output = %stats.output,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            keys_remapped = stats.keys_remapped,
            keys_skipped = stats.keys_skipped,
            "Merge committed"
        );

        Ok(stats)
    }
}

/// Copy the record at each key's last location into `builder`
fn copy_latest(
    batch: &[Arc<Segment>],
    latest: &HashMap<String, Location>,
    builder: &mut SegmentBuilder,
    remaps: &mut Vec<Remap>,
) -> Result<()> {
    let output_id = builder.id();

    for segment in batch {
        for item in segment.scan()? {
            let (offset, entry) = item?;
            let from = Location::new(segment.id(), offset);
            if latest.get(&entry.key) != Some(&from) {
                continue;
            }

            let new_offset = builder.add(&entry)?;
            remaps.push(Remap {
                key: entry.key,
                from,
                to: Location::new(output_id, new_offset),
            });
        }
    }

    Ok(())
}
