//! Issuance of [`AgentUid`]s, with optional reuse of freed slots.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use mote_core::AgentUid;
use tracing::debug;

use crate::uid_map::AgentUidMap;

/// Thread-safe uid source.
///
/// Normally uids come from a monotonic counter with reuse counter `0`.
/// In defragmentation mode the generator instead scans the uid map for
/// free slots and issues `(slot, previous_reused + 1)`, keeping the map
/// dense. When the scan runs off the end of the map the generator leaves
/// defragmentation mode by itself and returns to the counter.
///
/// The resource manager switches the mode at the end of each iteration
/// based on map utilization; see
/// [`ResourceManager::end_of_iteration`](crate::ResourceManager::end_of_iteration).
#[derive(Debug, Default)]
pub struct AgentUidGenerator {
    counter: AtomicU32,
    defragmenting: AtomicBool,
    search_index: Mutex<usize>,
}

impl AgentUidGenerator {
    /// A generator that starts issuing at index 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh uid. `map` must not change while uids issued from
    /// the same defragmentation pass are still uncommitted.
    pub fn generate(&self, map: &AgentUidMap) -> AgentUid {
        if self.defragmenting.load(Ordering::Acquire) {
            let mut search = self
                .search_index
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.defragmenting.load(Ordering::Acquire) {
                while *search < map.len() {
                    let idx = *search;
                    *search += 1;
                    if map.is_free(idx) {
                        let index = idx as u32;
                        self.counter.fetch_max(index + 1, Ordering::AcqRel);
                        return AgentUid::new(index, map.reused_at(idx).wrapping_add(1));
                    }
                }
                self.defragmenting.store(false, Ordering::Release);
                debug!(map_size = map.len(), "uid map exhausted, leaving defragmentation mode");
            }
        }
        AgentUid::new(self.counter.fetch_add(1, Ordering::AcqRel), 0)
    }

    /// Start reusing free slots, scanning from slot 0.
    pub fn enable_defragmentation(&self) {
        let mut search = self
            .search_index
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *search = 0;
        self.defragmenting.store(true, Ordering::Release);
    }

    /// Return to counter-based issuance.
    pub fn disable_defragmentation(&self) {
        self.defragmenting.store(false, Ordering::Release);
    }

    /// `true` while free slots are being reused.
    pub fn is_in_defragmentation_mode(&self) -> bool {
        self.defragmenting.load(Ordering::Acquire)
    }

    /// One past the highest index issued so far.
    pub fn highest_index(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Forget all issued uids.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Release);
        self.disable_defragmentation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mote_core::{AgentHandle, NumaNodeId};

    #[test]
    fn counter_mode_is_monotonic() {
        let gen = AgentUidGenerator::new();
        let map = AgentUidMap::new(4);
        assert_eq!(gen.generate(&map), AgentUid::new(0, 0));
        assert_eq!(gen.generate(&map), AgentUid::new(1, 0));
        assert_eq!(gen.highest_index(), 2);
    }

    #[test]
    fn defragmentation_reuses_freed_slot_with_bumped_counter() {
        let gen = AgentUidGenerator::new();
        let mut map = AgentUidMap::new(2);
        let h = AgentHandle::new(NumaNodeId(0), 0);
        let a = gen.generate(&map);
        let b = gen.generate(&map);
        map.insert(a, h);
        map.insert(b, h);
        map.remove(a);

        gen.enable_defragmentation();
        assert_eq!(gen.generate(&map), AgentUid::new(0, 1));
        // Slot 1 is live and the map has two slots: scan exhausted.
        assert_eq!(gen.generate(&map), AgentUid::new(2, 0));
        assert!(!gen.is_in_defragmentation_mode());
    }

    #[test]
    fn never_issued_slots_start_at_zero() {
        let gen = AgentUidGenerator::new();
        let map = AgentUidMap::new(3);
        gen.enable_defragmentation();
        assert_eq!(gen.generate(&map), AgentUid::new(0, 0));
        assert_eq!(gen.generate(&map), AgentUid::new(1, 0));
        assert_eq!(gen.highest_index(), 2);
    }

    #[test]
    fn counter_skips_indices_handed_out_by_defragmentation() {
        let gen = AgentUidGenerator::new();
        let map = AgentUidMap::new(5);
        gen.enable_defragmentation();
        for _ in 0..5 {
            gen.generate(&map);
        }
        gen.disable_defragmentation();
        assert_eq!(gen.generate(&map).index(), 5);
    }
}
