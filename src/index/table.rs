//! Index implementation
//!
//! HashMap-based index with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{Location, Remap};

/// Key → location of the most recent write
pub struct Index {
    entries: RwLock<HashMap<String, Location>>,
}

impl Index {
    /// Create a new empty index
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record the newest location of `key`, replacing any previous one
    pub fn put(&self, key: String, location: Location) {
        self.entries.write().insert(key, location);
    }

    /// Location of the newest record for `key`
    pub fn get(&self, key: &str) -> Option<Location> {
        self.entries.read().get(key).copied()
    }

    /// Redirect keys to their merged copies, atomically
    ///
    /// A key moves only if it still points exactly where the merge read it
    /// from. Anything written since then keeps its newer location.
    /// Returns the number of keys moved.
    pub fn remap(&self, remaps: &[Remap]) -> usize {
        let mut entries = self.entries.write();
        let mut applied = 0;

        for remap in remaps {
            if let Some(current) = entries.get_mut(&remap.key) {
                if *current == remap.from {
                    *current = remap.to;
                    applied += 1;
                }
            }
        }

        applied
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}
