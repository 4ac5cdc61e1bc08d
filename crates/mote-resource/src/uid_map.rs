//! Dense map from [`AgentUid`] to [`AgentHandle`].

use mote_core::{AgentHandle, AgentUid};

const UNISSUED: u32 = u32::MAX;

/// Uid-indexed table of agent locators.
///
/// Slot `i` holds the handle of the live agent whose uid index is `i`,
/// together with that uid's reuse counter. A lookup only succeeds if the
/// stored reuse counter matches the queried uid, so a stale uid never
/// resolves to a later occupant of the same slot. Freed slots keep their
/// reuse counter so the generator can issue `reused + 1`.
#[derive(Clone, Debug, Default)]
pub struct AgentUidMap {
    handles: Vec<Option<AgentHandle>>,
    reused: Vec<u32>,
    live: usize,
}

impl AgentUidMap {
    /// Slot count of a fresh map.
    pub const INITIAL_SIZE: usize = 100;

    /// An empty map with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            handles: vec![None; size],
            reused: vec![UNISSUED; size],
            live: 0,
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// `true` if the map has no slots.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of slots holding a live agent.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Grow to `size` slots. Never shrinks.
    pub fn resize(&mut self, size: usize) {
        if size > self.handles.len() {
            self.handles.resize(size, None);
            self.reused.resize(size, UNISSUED);
        }
    }

    /// Record `uid -> handle`, growing the map if `uid` lies beyond it.
    pub fn insert(&mut self, uid: AgentUid, handle: AgentHandle) {
        let idx = uid.index() as usize;
        if idx >= self.handles.len() {
            self.resize(idx + 1);
        }
        if self.handles[idx].is_none() {
            self.live += 1;
        }
        self.handles[idx] = Some(handle);
        self.reused[idx] = uid.reused();
    }

    /// Point an existing entry at a new handle. Returns `false` if `uid`
    /// is not live.
    pub fn update(&mut self, uid: AgentUid, handle: AgentHandle) -> bool {
        if self.get(uid).is_none() {
            return false;
        }
        self.handles[uid.index() as usize] = Some(handle);
        true
    }

    /// Handle of `uid`, if live.
    pub fn get(&self, uid: AgentUid) -> Option<AgentHandle> {
        let idx = uid.index() as usize;
        match self.handles.get(idx) {
            Some(Some(h)) if self.reused[idx] == uid.reused() => Some(*h),
            _ => None,
        }
    }

    /// `true` if `uid` is live.
    pub fn contains(&self, uid: AgentUid) -> bool {
        self.get(uid).is_some()
    }

    /// Remove `uid`, returning its last handle.
    pub fn remove(&mut self, uid: AgentUid) -> Option<AgentHandle> {
        let handle = self.get(uid)?;
        self.handles[uid.index() as usize] = None;
        self.live -= 1;
        Some(handle)
    }

    /// `true` if slot `index` holds no live agent.
    pub fn is_free(&self, index: usize) -> bool {
        matches!(self.handles.get(index), Some(None))
    }

    /// Reuse counter last issued for slot `index`, `u32::MAX` if the slot
    /// was never issued.
    pub fn reused_at(&self, index: usize) -> u32 {
        self.reused.get(index).copied().unwrap_or(UNISSUED)
    }

    /// Free every slot, keeping reuse counters and size.
    pub fn clear(&mut self) {
        self.handles.iter_mut().for_each(|h| *h = None);
        self.live = 0;
    }
}
