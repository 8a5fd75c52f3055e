//! Segment Set
//!
//! The active segment plus every sealed segment, oldest first.

use std::sync::Arc;

use crate::error::{KvError, Result};

use super::{Segment, SegmentId};

/// All live segments of a store
///
/// Sealed segments are shared as `Arc`s: a reader clones the handle, drops
/// the set's lock and reads at leisure, even if a merge removes the segment
/// from the set in the meantime.
pub struct SegmentSet {
    /// Ascending by id
    sealed: Vec<Arc<Segment>>,
    active: Arc<Segment>,
}

impl SegmentSet {
    pub fn new(sealed: Vec<Arc<Segment>>, active: Arc<Segment>) -> Self {
        debug_assert!(sealed.windows(2).all(|w| w[0].id() < w[1].id()));
        Self { sealed, active }
    }

    pub fn active(&self) -> &Arc<Segment> {
        &self.active
    }

    pub fn sealed(&self) -> &[Arc<Segment>] {
        &self.sealed
    }

    /// Look up any live segment by id
    pub fn find(&self, id: SegmentId) -> Option<&Arc<Segment>> {
        if self.active.id() == id {
            return Some(&self.active);
        }
        self.sealed
            .binary_search_by_key(&id, |segment| segment.id())
            .ok()
            .map(|idx| &self.sealed[idx])
    }

    /// Up to `max` of the oldest sealed segments
    pub fn oldest(&self, max: usize) -> Vec<Arc<Segment>> {
        self.sealed.iter().take(max).cloned().collect()
    }

    /// Install a new active segment; the previous one joins the sealed list
    pub fn rotate(&mut self, new_active: Arc<Segment>) -> Arc<Segment> {
        let previous = std::mem::replace(&mut self.active, new_active);
        self.sealed.push(Arc::clone(&previous));
        previous
    }

    /// Swap the oldest sealed segments `batch` for `merged`
    ///
    /// Fails without changing anything if `batch` is no longer the oldest
    /// prefix of the sealed list. Returns the removed segments.
    pub fn replace_prefix(
        &mut self,
        batch: &[SegmentId],
        merged: Arc<Segment>,
    ) -> Result<Vec<Arc<Segment>>> {
        let matches = self.sealed.len() >= batch.len()
            && self
                .sealed
                .iter()
                .zip(batch)
                .all(|(segment, id)| segment.id() == *id);
        if !matches {
            return Err(KvError::MergeAborted(
                "merge batch is no longer the oldest run of sealed segments".to_string(),
            ));
        }

        let removed: Vec<_> = self.sealed.drain(..batch.len()).collect();
        self.sealed.insert(0, merged);
        Ok(removed)
    }

    /// Ids of every live segment, oldest first (active last)
    pub fn ids(&self) -> Vec<SegmentId> {
        self.sealed
            .iter()
            .map(|segment| segment.id())
            .chain(std::iter::once(self.active.id()))
            .collect()
    }

    /// Number of live segments, active included
    pub fn len(&self) -> usize {
        self.sealed.len() + 1
    }

    /// Always false: there is always an active segment
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Total bytes across all live segments
    pub fn total_size(&self) -> u64 {
        self.sealed
            .iter()
            .map(|segment| segment.size())
            .sum::<u64>()
            + self.active.size()
    }
}
