//! Error types for logkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::segment::SegmentId;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for logkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    #[error("Segment {0} is sealed")]
    SegmentSealed(SegmentId),

    #[error("Offset {offset} out of range for segment {segment} (size {size})")]
    OutOfRange {
        segment: SegmentId,
        offset: u64,
        size: u64,
    },

    #[error("Index points at missing segment {0}")]
    MissingSegment(SegmentId),

    #[error("Write path failed, store no longer accepts writes: {0}")]
    WriteFailed(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Merge Errors
    // -------------------------------------------------------------------------
    #[error("Merge aborted: {0}")]
    MergeAborted(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
