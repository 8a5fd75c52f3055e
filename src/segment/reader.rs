//! Positioned reads
//!
//! A short-lived read handle for one lookup: its own file descriptor, seeked
//! to the record offset, closed when dropped.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;

/// Read handle positioned at a record start
pub struct PositionedReader {
    inner: BufReader<File>,
}

impl PositionedReader {
    /// Open `path` and seek to `offset`
    pub fn open(path: &Path, offset: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            inner: BufReader::new(file),
        })
    }
}

impl Read for PositionedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
