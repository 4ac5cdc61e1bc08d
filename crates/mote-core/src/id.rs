//! Strongly-typed identifiers for agents, NUMA nodes and simulation steps.

use std::fmt;

/// Identifies a NUMA node (memory/CPU locality domain).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumaNodeId(pub u16);

impl NumaNodeId {
    /// Node index as `usize`, for indexing per-node tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NumaNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for NumaNodeId {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Permanent identity of an agent.
///
/// `index` addresses a slot in the uid map; `reused` counts how many times
/// that slot has been handed out again after its previous owner was
/// removed. Two uids with the same index but different `reused` values
/// never alias, so a stale uid cannot resolve to the slot's new occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentUid {
    index: u32,
    reused: u32,
}

impl AgentUid {
    /// Create a uid from its slot index and reuse counter.
    pub const fn new(index: u32, reused: u32) -> Self {
        Self { index, reused }
    }

    /// Slot index in the uid map.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Number of times the slot has been reissued.
    pub const fn reused(self) -> u32 {
        self.reused
    }

    /// Placeholder carried by agents that have not been registered yet.
    pub const fn default_unassigned() -> Self {
        Self::new(u32::MAX, u32::MAX)
    }
}

impl fmt::Display for AgentUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.index, self.reused)
    }
}

impl From<u32> for AgentUid {
    fn from(index: u32) -> Self {
        Self::new(index, 0)
    }
}

/// Ephemeral locator of an agent: its NUMA shard and position in it.
///
/// Handles are invalidated by every structural commit and NUMA rebalance.
/// Resolve them from an [`AgentUid`] again after such an event; never keep
/// one across steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentHandle {
    numa_node: NumaNodeId,
    element_idx: u32,
}

impl AgentHandle {
    /// Create a handle for slot `element_idx` of `numa_node`'s shard.
    pub const fn new(numa_node: NumaNodeId, element_idx: u32) -> Self {
        Self {
            numa_node,
            element_idx,
        }
    }

    /// The shard the agent lives in.
    pub const fn numa_node(self) -> NumaNodeId {
        self.numa_node
    }

    /// Position of the agent inside its shard.
    pub const fn element_idx(self) -> u32 {
        self.element_idx
    }
}

impl fmt::Display for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.numa_node, self.element_idx)
    }
}

/// Monotonically increasing simulation step counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u64);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StepId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
