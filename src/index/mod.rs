//! Index Module
//!
//! In-memory hash index from key to the location of its newest record.
//!
//! ## Responsibilities
//! - Last-write-wins point updates from the writer
//! - Concurrent lookups from readers
//! - Conditional batch remaps from the merger
//!
//! ## Data Structure Choice
//! `HashMap` behind a `parking_lot::RwLock`: point lookups only, no ordering
//! needed. The remap runs under a single write-lock acquisition so it is
//! atomic with respect to concurrent `put`s.

mod table;

pub use table::Index;

use crate::segment::SegmentId;

/// Where the newest record of a key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub segment: SegmentId,
    pub offset: u64,
}

impl Location {
    pub fn new(segment: SegmentId, offset: u64) -> Self {
        Self { segment, offset }
    }
}

/// One conditional move requested by a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
    pub key: String,
    /// Location the merge read the key from
    pub from: Location,
    /// Location of the copy in the merged segment
    pub to: Location,
}
