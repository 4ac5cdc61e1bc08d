//! Errors raised while building thread topology and pools.

use std::error::Error;
use std::fmt;

/// Errors from [`ThreadInfo`](crate::ThreadInfo) construction, pool
/// creation and parallel container fills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumaError {
    /// A pool must have at least one thread.
    NoThreads,
    /// The topology declared zero NUMA nodes.
    NoNodes,
    /// The topology mapped a thread to a node outside `0..numa_nodes`.
    NodeOutOfRange {
        /// Offending thread id.
        thread: usize,
        /// Node it was mapped to.
        node: usize,
        /// Declared node count.
        numa_nodes: usize,
    },
    /// A NUMA node has no threads. Every node's shard needs at least one
    /// thread to process it.
    EmptyNode {
        /// The node without threads.
        node: usize,
    },
    /// The underlying thread pool could not be built.
    PoolBuild {
        /// Description reported by rayon.
        reason: String,
    },
    /// A parallel fill did not initialise every requested slot.
    IncompleteFill {
        /// Slots requested.
        expected: usize,
        /// Slots actually written.
        written: usize,
    },
}

impl fmt::Display for NumaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoThreads => write!(f, "thread pool needs at least one thread"),
            Self::NoNodes => write!(f, "topology declares no NUMA nodes"),
            Self::NodeOutOfRange {
                thread,
                node,
                numa_nodes,
            } => write!(
                f,
                "thread {thread} mapped to NUMA node {node}, but only {numa_nodes} nodes exist"
            ),
            Self::EmptyNode { node } => write!(f, "NUMA node {node} has no threads"),
            Self::PoolBuild { reason } => write!(f, "failed to build thread pool: {reason}"),
            Self::IncompleteFill { expected, written } => write!(
                f,
                "parallel fill wrote {written} of {expected} slots"
            ),
        }
    }
}

impl Error for NumaError {}
