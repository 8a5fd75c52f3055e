//! Segment Module
//!
//! Append-only segment files holding back-to-back codec records.
//!
//! ## Responsibilities
//! - Append records to the single active segment and hand back their offsets
//! - Positioned point reads of one value
//! - Sequential scans for recovery and merging
//! - Sealing (immutable from then on) and deferred deletion
//!
//! ## Directory Layout
//! ```text
//! segments/
//!   segment_000001_000.log     sealed
//!   segment_000003_001.log     sealed, produced by a merge of 1..=3
//!   segment_000004_000.log     active
//!   segment_000006_001.log.tmp merge output not yet installed
//! ```
//!
//! A file name carries the segment id: `seq` then `generation`. Rotation bumps
//! `seq`; a merge keeps the `seq` of the newest input and bumps `generation`,
//! so sorting file names by id reproduces write order.

mod builder;
mod iterator;
mod reader;
mod segment;
mod set;

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

pub use builder::SegmentBuilder;
pub use iterator::SegmentIterator;
pub use reader::PositionedReader;
pub use segment::Segment;
pub use set::SegmentSet;

const FILE_PREFIX: &str = "segment_";
const FILE_EXTENSION: &str = ".log";
const TEMP_EXTENSION: &str = ".tmp";

/// Identifier of a segment, ordered by `(seq, generation)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId {
    /// Rotation sequence number
    pub seq: u64,

    /// 0 for rotated segments, bumped by each merge that ends at `seq`
    pub generation: u32,
}

impl SegmentId {
    pub fn new(seq: u64, generation: u32) -> Self {
        Self { seq, generation }
    }

    /// Id for a merge output replacing a batch that ends at `self`
    pub fn merged(&self) -> Self {
        Self {
            seq: self.seq,
            generation: self.generation + 1,
        }
    }

    /// Whether this segment was written by a merge
    pub fn is_merged(&self) -> bool {
        self.generation > 0
    }

    /// "segment_000042_000.log"
    pub fn file_name(&self) -> String {
        format!(
            "{}{:06}_{:03}{}",
            FILE_PREFIX, self.seq, self.generation, FILE_EXTENSION
        )
    }

    /// "segment_000042_001.log.tmp"
    pub fn temp_file_name(&self) -> String {
        format!("{}{}", self.file_name(), TEMP_EXTENSION)
    }

    /// "segment_000042_000.log" → Some(SegmentId { seq: 42, generation: 0 })
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_EXTENSION)?;
        let (seq, generation) = stem.split_once('_')?;
        Some(Self {
            seq: seq.parse().ok()?,
            generation: generation.parse().ok()?,
        })
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.seq, self.generation)
    }
}

/// Contents of a segment directory
#[derive(Debug, Default)]
pub struct DirListing {
    /// Segment ids in ascending order
    pub segments: Vec<SegmentId>,

    /// Leftover merge outputs that never got renamed into place
    pub temp_files: Vec<std::path::PathBuf>,
}

/// List segment files in `dir`, sorted by id
pub fn list_dir(dir: &Path) -> io::Result<DirListing> {
    let mut listing = DirListing::default();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(TEMP_EXTENSION) {
            listing.temp_files.push(path);
        } else if let Some(id) = SegmentId::parse_file_name(&name) {
            listing.segments.push(id);
        }
    }

    listing.segments.sort();
    Ok(listing)
}

/// fsync a directory so renames and new files inside it survive a crash
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
