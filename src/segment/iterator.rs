//! Segment Iterator
//!
//! Sequential iteration over the records of a segment, in write order.

use std::fs::File;
use std::io::{BufReader, Read, Take};
use std::path::Path;

use crate::codec::{read_entry, Entry};
use crate::error::{KvError, Result};

/// Iterator over `(offset, entry)` pairs of one segment
///
/// Bounded by the segment size observed at open time, so appends racing with
/// the scan are never seen half-written. The first record that fails to
/// decode is yielded as an error and ends the iteration.
pub struct SegmentIterator {
    reader: BufReader<Take<File>>,
    /// Start of the next unread record
    position: u64,
    end: u64,
    done: bool,
}

impl SegmentIterator {
    pub(super) fn open(path: &Path, end: u64) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file.take(end)),
            position: 0,
            end,
            done: false,
        })
    }

    /// Length of the valid prefix read so far
    ///
    /// After the iterator reported a corrupt record this is where that
    /// record starts, i.e. where the segment should be truncated.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes the scan will cover
    pub fn end(&self) -> u64 {
        self.end
    }
}

impl Iterator for SegmentIterator {
    type Item = Result<(u64, Entry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.end {
            return None;
        }

        match read_entry(&mut self.reader) {
            Ok(Some(entry)) => {
                let offset = self.position;
                self.position += entry.encoded_len() as u64;
                Some(Ok((offset, entry)))
            }
            Ok(None) => {
                // File is shorter than the size we were handed
                self.done = true;
                Some(Err(KvError::CorruptRecord(format!(
                    "segment ends at {} before expected end {}",
                    self.position, self.end
                ))))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
