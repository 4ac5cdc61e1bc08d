//! Errors raised by agent storage and its parallel primitives.

use std::error::Error;
use std::fmt;

use mote_core::{AgentHandle, AgentUid};
use mote_numa::NumaError;

/// Errors from [`ResourceManager`](crate::ResourceManager) operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// No live agent has this uid (never added, removed, or stale).
    UnknownUid(AgentUid),
    /// A handle points past the end of its shard.
    InvalidHandle(AgentHandle),
    /// A NUMA node index outside the manager's shards.
    NodeOutOfRange {
        /// Requested node.
        node: usize,
        /// Number of shards.
        numa_nodes: usize,
    },
    /// The manager's shard count does not match the pool's topology.
    ShardMismatch {
        /// Shards held by the manager.
        shards: usize,
        /// NUMA nodes reported by the pool.
        numa_nodes: usize,
    },
    /// Agent accounting disagrees between two views of the population.
    CountMismatch {
        /// What was being compared.
        context: &'static str,
        /// Count held by the manager.
        expected: usize,
        /// Count observed.
        actual: usize,
    },
    /// A parallel container operation failed.
    Numa(NumaError),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownUid(uid) => write!(f, "no live agent with uid {uid}"),
            Self::InvalidHandle(h) => write!(f, "agent handle {h} is out of range"),
            Self::NodeOutOfRange { node, numa_nodes } => {
                write!(f, "NUMA node {node} out of range (have {numa_nodes})")
            }
            Self::ShardMismatch { shards, numa_nodes } => write!(
                f,
                "resource manager has {shards} shards but the pool has {numa_nodes} NUMA nodes"
            ),
            Self::CountMismatch {
                context,
                expected,
                actual,
            } => write!(f, "{context}: expected {expected} agents, found {actual}"),
            Self::Numa(e) => write!(f, "numa: {e}"),
        }
    }
}

impl Error for ResourceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Numa(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NumaError> for ResourceError {
    fn from(e: NumaError) -> Self {
        Self::Numa(e)
    }
}
