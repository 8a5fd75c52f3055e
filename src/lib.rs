//! # logkv
//!
//! A log-structured key-value store with:
//! - Append-only segment files with size-based rotation
//! - In-memory hash index of the newest location of every key
//! - Crash recovery by replaying segments, dropping torn tails
//! - Background merging of sealed segments
//! - Single-writer/multi-reader concurrency model
//! - TCP-based client protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Datastore                                │
//! │            (Single Writer / Multi Reader)                    │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐            ┌─────────────────┐
//!   │      Index      │            │    Segments     │◄──┐
//!   │ key → (seg,off) │            │ active + sealed │   │
//!   └────────▲────────┘            └─────────────────┘   │
//!            │ remap                                     │ swap
//!            │         ┌─────────────────┐               │
//!            └─────────┤     Merger      ├───────────────┘
//!                      │  (background)   │
//!                      └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod segment;
pub mod index;
pub mod datastore;
pub mod merge;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, SyncStrategy};
pub use datastore::{Datastore, RecoveryReport};
pub use merge::{MergeStats, Merger};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of logkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
