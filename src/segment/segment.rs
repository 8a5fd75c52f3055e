//! Segment file handle
//!
//! One append-only file. The active segment owns a buffered writer; sealed
//! segments have none and are only ever read.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::codec::{self, Entry};
use crate::config::SyncStrategy;
use crate::error::{KvError, Result};

use super::{sync_dir, PositionedReader, SegmentId, SegmentIterator};

/// An append-only segment file
///
/// ## Concurrency
/// - `append`/`seal`/`sync` serialize on the writer mutex
/// - `size` is published only after the record bytes reach the OS, so any
///   reader that sees an offset below `size` can read a whole record
/// - reads open their own file handle and never touch the writer
pub struct Segment {
    id: SegmentId,
    path: PathBuf,

    /// Bytes of complete records in the file
    size: AtomicU64,

    sealed: AtomicBool,

    /// Set once an append failed; the file tail is unknown from then on
    failed: AtomicBool,

    /// Remove the file when the last handle is dropped
    obsolete: AtomicBool,

    /// `None` once sealed (or for segments loaded read-only)
    writer: Mutex<Option<SegmentWriter>>,
}

struct SegmentWriter {
    file: BufWriter<File>,
    sync_strategy: SyncStrategy,
    unsynced: usize,
}

impl SegmentWriter {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
            SyncStrategy::OnSeal => false,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }
}

impl Segment {
    /// Create a new, empty active segment
    pub fn create(dir: &Path, id: SegmentId, sync_strategy: SyncStrategy) -> Result<Self> {
        let path = dir.join(id.file_name());
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)?;
        sync_dir(dir)?;

        Ok(Self::with_writer(id, path, 0, file, sync_strategy))
    }

    /// Reopen an existing segment as the active one, appending after its end
    pub fn resume(dir: &Path, id: SegmentId, sync_strategy: SyncStrategy) -> Result<Self> {
        let path = dir.join(id.file_name());
        let file = OpenOptions::new().append(true).open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self::with_writer(id, path, size, file, sync_strategy))
    }

    /// Open an existing segment read-only (sealed)
    pub fn load(dir: &Path, id: SegmentId) -> Result<Self> {
        let path = dir.join(id.file_name());
        let size = fs::metadata(&path)?.len();

        Ok(Self {
            id,
            path,
            size: AtomicU64::new(size),
            sealed: AtomicBool::new(true),
            failed: AtomicBool::new(false),
            obsolete: AtomicBool::new(false),
            writer: Mutex::new(None),
        })
    }

    fn with_writer(
        id: SegmentId,
        path: PathBuf,
        size: u64,
        file: File,
        sync_strategy: SyncStrategy,
    ) -> Self {
        Self {
            id,
            path,
            size: AtomicU64::new(size),
            sealed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            obsolete: AtomicBool::new(false),
            writer: Mutex::new(Some(SegmentWriter {
                file: BufWriter::new(file),
                sync_strategy,
                unsynced: 0,
            })),
        }
    }

    /// Append an entry, returning the offset its record starts at
    pub fn append(&self, entry: &Entry) -> Result<u64> {
        let mut guard = self.writer.lock();

        if self.failed.load(Ordering::Acquire) {
            return Err(KvError::WriteFailed(format!(
                "segment {} lost a write earlier",
                self.id
            )));
        }
        let writer = match guard.as_mut() {
            Some(writer) => writer,
            None => return Err(KvError::SegmentSealed(self.id)),
        };

        let bytes = entry.encode();
        let offset = self.size.load(Ordering::Acquire);

        if let Err(e) = writer.write(&bytes) {
            self.failed.store(true, Ordering::Release);
            *guard = None;
            tracing::error!(segment = %self.id, error = %e, "Segment append failed");
            return Err(KvError::Io(e));
        }

        self.size
            .store(offset + bytes.len() as u64, Ordering::Release);
        Ok(offset)
    }

    /// Read the value of the record starting at `offset`
    pub fn read_at(&self, offset: u64) -> Result<Vec<u8>> {
        let size = self.size();
        if offset >= size {
            return Err(KvError::OutOfRange {
                segment: self.id,
                offset,
                size,
            });
        }

        let mut reader = PositionedReader::open(&self.path, offset)?;
        codec::read_value(&mut reader)
    }

    /// Scan all complete records present when the scan starts
    pub fn scan(&self) -> Result<SegmentIterator> {
        SegmentIterator::open(&self.path, self.size())
    }

    /// Flush, fsync and stop accepting appends
    pub fn seal(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        if let Some(mut writer) = guard.take() {
            writer.file.flush()?;
            writer.file.get_ref().sync_all()?;
        }
        self.sealed.store(true, Ordering::Release);
        Ok(())
    }

    /// Force buffered appends to disk
    pub fn sync(&self) -> Result<()> {
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.sync()?;
        }
        Ok(())
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of complete records written so far
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Cut the file back to `len` bytes (recovery only, before any traffic)
    pub(crate) fn truncate(&self, len: u64) -> Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_all()?;
        self.size.store(len, Ordering::Release);
        Ok(())
    }

    /// Delete the file once every handle to this segment is gone
    pub(crate) fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if !self.obsolete.load(Ordering::Acquire) {
            return;
        }

        self.writer.get_mut().take();
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(segment = %self.id, "Removed obsolete segment file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                segment = %self.id,
                error = %e,
                "Failed to delete obsolete segment file"
            ),
        }
    }
}
