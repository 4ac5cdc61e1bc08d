//! Platform abstraction over thread placement.

/// Describes how pool threads map onto NUMA nodes, and optionally pins
/// them there.
///
/// Implementations are queried when a [`ThreadInfo`](crate::ThreadInfo) is
/// built or renewed, and [`pin`](Topology::pin) runs once on each worker
/// as it starts.
pub trait Topology: Send + Sync {
    /// Number of NUMA nodes.
    fn numa_nodes(&self) -> usize;

    /// NUMA node of pool thread `thread` in a pool of `max_threads`.
    fn numa_node_of(&self, thread: usize, max_threads: usize) -> usize;

    /// Bind the calling thread to `node`. The default does nothing.
    fn pin(&self, _thread: usize, _node: usize) {}
}

/// Every thread on node 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleNode;

impl Topology for SingleNode {
    fn numa_nodes(&self) -> usize {
        1
    }

    fn numa_node_of(&self, _thread: usize, _max_threads: usize) -> usize {
        0
    }
}

/// Threads split into `nodes` contiguous blocks of near-equal size.
///
/// With 8 threads and 3 nodes the layout is `[0, 0, 0, 1, 1, 1, 2, 2]`.
#[derive(Clone, Copy, Debug)]
pub struct BlockTopology {
    nodes: usize,
}

impl BlockTopology {
    /// A layout with `nodes` NUMA nodes.
    pub fn new(nodes: usize) -> Self {
        Self { nodes }
    }
}

impl Topology for BlockTopology {
    fn numa_nodes(&self) -> usize {
        self.nodes
    }

    fn numa_node_of(&self, thread: usize, max_threads: usize) -> usize {
        if max_threads == 0 {
            return 0;
        }
        thread * self.nodes / max_threads
    }
}

/// An explicit thread-to-node table, indexed by thread id.
///
/// Threads beyond the table's length land on node 0. Useful to describe a
/// layout after an affinity change and feed it to
/// [`ThreadInfo::renew`](crate::ThreadInfo::renew).
#[derive(Clone, Debug)]
pub struct ExplicitTopology {
    nodes: usize,
    mapping: Vec<usize>,
}

impl ExplicitTopology {
    /// A layout with `nodes` nodes where thread `t` sits on `mapping[t]`.
    pub fn new(nodes: usize, mapping: Vec<usize>) -> Self {
        Self { nodes, mapping }
    }
}

impl Topology for ExplicitTopology {
    fn numa_nodes(&self) -> usize {
        self.nodes
    }

    fn numa_node_of(&self, thread: usize, _max_threads: usize) -> usize {
        self.mapping.get(thread).copied().unwrap_or(0)
    }
}
