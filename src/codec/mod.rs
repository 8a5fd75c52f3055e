//! Entry Codec Module
//!
//! Serializes single key-value records into the self-delimiting layout that
//! segment files are made of.
//!
//! ## Record Format
//! ```text
//! ┌───────────┬────────────┬───────┬────────────┬─────────┬───────────┐
//! │ Total (4) │ KeyLen (4) │  Key  │ ValLen (4) │  Value  │ CRC32 (4) │
//! └───────────┴────────────┴───────┴────────────┴─────────┴───────────┘
//! ```
//!
//! - All integers are little-endian `u32`
//! - `Total` counts every byte after itself
//! - `CRC32` covers `KeyLen` through the end of `Value`
//!
//! Records are laid back to back with no separators, so a reader positioned
//! at a record start can always find the next one from the length prefix.

mod entry;
mod reader;

pub use entry::{Entry, LEN_SIZE, MAX_RECORD_SIZE, RECORD_OVERHEAD};
pub use reader::{read_entry, read_value};
