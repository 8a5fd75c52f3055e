//! Merge Module
//!
//! Background compaction of sealed segments.
//!
//! ## Algorithm
//! 1. Snapshot the oldest contiguous run of sealed segments (the batch)
//! 2. Scan the batch oldest first and remember each key's last location
//! 3. Scan again and copy exactly those records into a new segment, written
//!    under a temporary name, fsynced, then renamed into place
//! 4. Under the segment-set write lock: swap the batch for the new segment
//!    and remap the index, moving only keys that still point into the batch
//! 5. Old segment files are deleted when their last reader lets go
//!
//! The merged segment takes the id `(last.seq, last.generation + 1)`, so it
//! sorts after everything it replaces and before every newer segment. If the
//! process dies after step 3, recovery sees the merged file and drops the
//! segments it covers; before step 3 only a `.tmp` file exists and is
//! discarded.

mod merger;
mod worker;

pub use merger::{MergeStats, Merger, PendingMerge};
pub use worker::MergeWorker;
