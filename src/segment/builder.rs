//! Segment Builder
//!
//! Writes a merge output under a temporary name and installs it atomically.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::codec::Entry;
use crate::error::{KvError, Result};

use super::{sync_dir, Segment, SegmentId};

/// Builder for a sealed segment produced by a merge
///
/// Records go to `<name>.tmp`; `finish()` makes the file durable and only
/// then renames it to its final name. A crash before the rename leaves a
/// `.tmp` file that recovery throws away. A builder dropped before `finish`
/// succeeded removes whatever it wrote, so the same id can be built again.
pub struct SegmentBuilder {
    dir: PathBuf,
    id: SegmentId,
    temp_path: PathBuf,
    /// `None` once `finish` has taken the file
    writer: Option<BufWriter<File>>,
    /// Current write position (offset of the next record)
    offset: u64,
    entry_count: u64,
    installed: bool,
}

impl SegmentBuilder {
    /// Start a new segment `id` in `dir`
    ///
    /// Fails if a segment file `id` already exists. A leftover temporary
    /// file from an earlier failed build is overwritten.
    pub fn new(dir: &Path, id: SegmentId) -> Result<Self> {
        let final_path = dir.join(id.file_name());
        if final_path.exists() {
            return Err(KvError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("segment {} already exists", id),
            )));
        }

        let temp_path = dir.join(id.temp_file_name());
        if temp_path.exists() {
            tracing::warn!(segment = %id, "Overwriting leftover merge output");
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            id,
            temp_path,
            writer: Some(BufWriter::new(file)),
            offset: 0,
            entry_count: 0,
            installed: false,
        })
    }

    /// Append an entry, returning its offset in the finished segment
    pub fn add(&mut self, entry: &Entry) -> Result<u64> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            KvError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("segment {} already finished", self.id),
            ))
        })?;

        let bytes = entry.encode();
        let offset = self.offset;

        writer.write_all(&bytes)?;
        self.offset += bytes.len() as u64;
        self.entry_count += 1;

        Ok(offset)
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Bytes written so far
    pub fn size(&self) -> u64 {
        self.offset
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// fsync, rename into place, fsync the directory, open as sealed
    ///
    /// On error nothing of this build is left on disk.
    pub fn finish(mut self) -> Result<Segment> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| {
                KvError::Io(io::Error::new(
                    e.error().kind(),
                    format!("Failed to flush segment {}: {}", self.id, e.error()),
                ))
            })?;
            file.sync_all()?;
        }

        let final_path = self.dir.join(self.id.file_name());
        fs::rename(&self.temp_path, &final_path)?;

        let installed = sync_dir(&self.dir)
            .map_err(KvError::from)
            .and_then(|()| Segment::load(&self.dir, self.id));
        match installed {
            Ok(segment) => {
                self.installed = true;
                Ok(segment)
            }
            Err(e) => {
                remove_quietly(&final_path);
                Err(e)
            }
        }
    }

    /// Throw away the partial output
    pub fn abandon(self) {}
}

impl Drop for SegmentBuilder {
    fn drop(&mut self) {
        if self.installed {
            return;
        }
        self.writer.take();
        if self.temp_path.exists() {
            remove_quietly(&self.temp_path);
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove unfinished merge output"
            );
        }
    }
}
