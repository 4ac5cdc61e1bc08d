//! Thread-to-NUMA-node bookkeeping.

use std::ops::Range;

use mote_core::NumaNodeId;

use crate::error::NumaError;
use crate::topology::Topology;

/// Topology snapshot of a thread pool.
///
/// For each thread id it records the NUMA node, the thread's dense index
/// among that node's threads, and each node's thread count. The snapshot
/// is taken once at construction; call [`renew`](ThreadInfo::renew) after
/// thread affinity changes, until then the mapping may be stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadInfo {
    max_threads: usize,
    numa_nodes: usize,
    thread_numa_mapping: Vec<NumaNodeId>,
    numa_thread_id: Vec<usize>,
    threads_in_numa: Vec<usize>,
}

impl ThreadInfo {
    /// Build the mapping for a pool of `max_threads` threads.
    pub fn new(max_threads: usize, topology: &dyn Topology) -> Result<Self, NumaError> {
        let mut info = Self {
            max_threads: 0,
            numa_nodes: 0,
            thread_numa_mapping: Vec::new(),
            numa_thread_id: Vec::new(),
            threads_in_numa: Vec::new(),
        };
        info.renew_with(max_threads, topology)?;
        Ok(info)
    }

    /// A single-node mapping for `max_threads` threads.
    pub fn single_node(max_threads: usize) -> Result<Self, NumaError> {
        Self::new(max_threads, &crate::topology::SingleNode)
    }

    /// Re-query the topology for the current pool size.
    ///
    /// On error the previous mapping is kept.
    pub fn renew(&mut self, topology: &dyn Topology) -> Result<(), NumaError> {
        self.renew_with(self.max_threads, topology)
    }

    fn renew_with(&mut self, max_threads: usize, topology: &dyn Topology) -> Result<(), NumaError> {
        if max_threads == 0 {
            return Err(NumaError::NoThreads);
        }
        let numa_nodes = topology.numa_nodes();
        if numa_nodes == 0 {
            return Err(NumaError::NoNodes);
        }

        let mut mapping = Vec::with_capacity(max_threads);
        let mut numa_thread_id = Vec::with_capacity(max_threads);
        let mut threads_in_numa = vec![0usize; numa_nodes];
        for thread in 0..max_threads {
            let node = topology.numa_node_of(thread, max_threads);
            if node >= numa_nodes {
                return Err(NumaError::NodeOutOfRange {
                    thread,
                    node,
                    numa_nodes,
                });
            }
            let node_id = u16::try_from(node).map_err(|_| NumaError::NodeOutOfRange {
                thread,
                node,
                numa_nodes,
            })?;
            mapping.push(NumaNodeId(node_id));
            numa_thread_id.push(threads_in_numa[node]);
            threads_in_numa[node] += 1;
        }
        if let Some(node) = threads_in_numa.iter().position(|&n| n == 0) {
            return Err(NumaError::EmptyNode { node });
        }

        self.max_threads = max_threads;
        self.numa_nodes = numa_nodes;
        self.thread_numa_mapping = mapping;
        self.numa_thread_id = numa_thread_id;
        self.threads_in_numa = threads_in_numa;
        Ok(())
    }

    /// NUMA node of thread `tid`.
    pub fn numa_node(&self, tid: usize) -> NumaNodeId {
        self.thread_numa_mapping[tid]
    }

    /// Index of thread `tid` among the threads of its node.
    pub fn numa_thread_id(&self, tid: usize) -> usize {
        self.numa_thread_id[tid]
    }

    /// Number of threads on `node`.
    pub fn threads_in_numa_node(&self, node: NumaNodeId) -> usize {
        self.threads_in_numa[node.index()]
    }

    /// Pool size.
    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Number of NUMA nodes.
    pub fn numa_nodes(&self) -> usize {
        self.numa_nodes
    }

    /// Iterate node ids `0..numa_nodes`.
    pub fn nodes(&self) -> impl Iterator<Item = NumaNodeId> + '_ {
        (0..self.numa_nodes).map(|n| NumaNodeId(n as u16))
    }
}

/// Contiguous part `part` of `len` items split into `parts` pieces of
/// `ceil(len / parts)` items. Trailing parts may be short or empty.
pub fn static_chunk_range(len: usize, parts: usize, part: usize) -> Range<usize> {
    if parts == 0 {
        return 0..0;
    }
    let chunk = len.div_ceil(parts);
    let start = (part * chunk).min(len);
    let end = (start + chunk).min(len);
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{BlockTopology, ExplicitTopology};

    #[test]
    fn single_node_numbers_threads_densely() {
        let info = ThreadInfo::single_node(4).unwrap();
        assert_eq!(info.numa_nodes(), 1);
        assert_eq!(info.max_threads(), 4);
        assert_eq!(info.threads_in_numa_node(NumaNodeId(0)), 4);
        for t in 0..4 {
            assert_eq!(info.numa_node(t), NumaNodeId(0));
            assert_eq!(info.numa_thread_id(t), t);
        }
    }

    #[test]
    fn block_topology_counts_per_node() {
        let info = ThreadInfo::new(8, &BlockTopology::new(3)).unwrap();
        assert_eq!(info.threads_in_numa_node(NumaNodeId(0)), 3);
        assert_eq!(info.threads_in_numa_node(NumaNodeId(1)), 3);
        assert_eq!(info.threads_in_numa_node(NumaNodeId(2)), 2);
        assert_eq!(info.numa_node(4), NumaNodeId(1));
        assert_eq!(info.numa_thread_id(4), 1);
        assert_eq!(info.numa_thread_id(7), 1);
        let total: usize = info.nodes().map(|n| info.threads_in_numa_node(n)).sum();
        assert_eq!(total, info.max_threads());
    }

    #[test]
    fn renew_picks_up_new_affinity() {
        let mut info = ThreadInfo::new(4, &ExplicitTopology::new(2, vec![0, 0, 1, 1])).unwrap();
        assert_eq!(info.numa_node(1), NumaNodeId(0));
        info.renew(&ExplicitTopology::new(2, vec![0, 1, 1, 1])).unwrap();
        assert_eq!(info.numa_node(1), NumaNodeId(1));
        assert_eq!(info.numa_thread_id(1), 0);
        assert_eq!(info.threads_in_numa_node(NumaNodeId(1)), 3);
    }

    #[test]
    fn failed_renew_keeps_previous_mapping() {
        let mut info = ThreadInfo::new(2, &BlockTopology::new(2)).unwrap();
        let before = info.clone();
        let err = info.renew(&ExplicitTopology::new(2, vec![0, 5])).unwrap_err();
        assert!(matches!(err, NumaError::NodeOutOfRange { node: 5, .. }));
        assert_eq!(info, before);
    }

    #[test]
    fn rejects_empty_node_and_zero_threads() {
        let err = ThreadInfo::new(2, &ExplicitTopology::new(3, vec![0, 2])).unwrap_err();
        assert_eq!(err, NumaError::EmptyNode { node: 1 });
        assert_eq!(ThreadInfo::single_node(0).unwrap_err(), NumaError::NoThreads);
    }

    #[test]
    fn static_ranges_cover_exactly() {
        assert_eq!(static_chunk_range(10, 3, 0), 0..4);
        assert_eq!(static_chunk_range(10, 3, 1), 4..8);
        assert_eq!(static_chunk_range(10, 3, 2), 8..10);
        assert_eq!(static_chunk_range(2, 4, 3), 2..2);
        assert_eq!(static_chunk_range(5, 0, 0), 0..0);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn static_ranges_partition(len in 0usize..500, parts in 1usize..70) {
                let mut next = 0;
                for part in 0..parts {
                    let r = static_chunk_range(len, parts, part);
                    prop_assert_eq!(r.start, next);
                    next = r.end;
                }
                prop_assert_eq!(next, len);
            }
        }
    }
}
