//! Locality-driven NUMA rebalancing.
//!
//! Rebalancing turns spatial locality into memory locality: agents are
//! copied into fresh per-node storage in a spatially coherent order (the
//! grid's Z-order), node by node, each node receiving a share of the
//! population proportional to its thread count. Every destination slot
//! is written by a thread of the node that owns it.

use mote_core::{exclusive_prefix_sum, Agent, AgentHandle};
use mote_numa::{NumaPool, NumaVector, ThreadInfo};
use tracing::debug;

use crate::error::ResourceError;
use crate::manager::ResourceManager;

/// A total order over all live agents, by handle.
///
/// Implemented by the spatial grid (Z-order over its boxes). Positions
/// are `0..len()`; [`visit_range`](LocalityOrder::visit_range) must yield
/// exactly `count` handles starting at position `start`.
pub trait LocalityOrder: Sync {
    /// Number of agents covered by the order.
    fn len(&self) -> usize;

    /// `true` if the order covers no agent.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` for the handles at positions `start..start + count`.
    fn visit_range(&self, start: usize, count: usize, f: &mut dyn FnMut(AgentHandle));
}

impl LocalityOrder for Vec<AgentHandle> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn visit_range(&self, start: usize, count: usize, f: &mut dyn FnMut(AgentHandle)) {
        for h in &self.as_slice()[start..start + count] {
            f(*h);
        }
    }
}

/// Target shard sizes: node `n >= 1` gets `total * threads(n) / max_threads`,
/// node 0 takes the remainder.
pub fn target_shard_sizes(total: usize, info: &ThreadInfo) -> Vec<usize> {
    let max = info.max_threads();
    let mut sizes: Vec<usize> = info
        .nodes()
        .map(|n| total * info.threads_in_numa_node(n) / max)
        .collect();
    let rest: usize = sizes.iter().skip(1).sum();
    sizes[0] = total - rest;
    sizes
}

impl<A: Agent> ResourceManager<A> {
    /// Redistribute agents over nodes in `order`, proportionally to each
    /// node's thread count, then rebuild the uid map.
    ///
    /// Node 0 receives the first agents of the order, node 1 the next
    /// ones, and so on. All handles change.
    pub fn sort_and_balance_numa_nodes(
        &mut self,
        pool: &NumaPool,
        order: &dyn LocalityOrder,
    ) -> Result<(), ResourceError> {
        let info = pool.thread_info();
        if self.agents.len() != info.numa_nodes() {
            return Err(ResourceError::ShardMismatch {
                shards: self.agents.len(),
                numa_nodes: info.numa_nodes(),
            });
        }
        let total = self.num_agents();
        if order.len() != total {
            tracing::error!(order = order.len(), total, "locality order is stale");
            return Err(ResourceError::CountMismatch {
                context: "locality order",
                expected: total,
                actual: order.len(),
            });
        }

        let sizes = target_shard_sizes(total, info);
        let mut offsets = sizes.clone();
        exclusive_prefix_sum(&mut offsets);

        let mut balanced: Vec<NumaVector<A>> = info
            .nodes()
            .zip(&sizes)
            .map(|(node, &len)| NumaVector::with_capacity(node, len))
            .collect();
        {
            let this = &*self;
            NumaVector::fill_all_parallel(pool, &mut balanced, &sizes, |node, range, emit| {
                order.visit_range(offsets[node] + range.start, range.len(), &mut |h| {
                    if let Some(agent) = this.agent_at(h) {
                        emit(agent.clone());
                    }
                });
            })?;
        }

        self.agents = balanced;
        self.rebuild_uid_map();
        debug!(agents = total, shards = ?sizes, "rebalanced NUMA shards");
        if self.uid_map.live() != total {
            return Err(ResourceError::CountMismatch {
                context: "rebalance",
                expected: total,
                actual: self.uid_map.live(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mote_core::{Cell, NumaNodeId};
    use mote_numa::BlockTopology;
    use std::sync::Arc;

    #[test]
    fn proportional_targets_with_remainder_on_node_zero() {
        let info = ThreadInfo::new(8, &BlockTopology::new(3)).unwrap();
        // threads per node 3, 3, 2
        assert_eq!(target_shard_sizes(100, &info), vec![38, 37, 25]);
        assert_eq!(target_shard_sizes(0, &info), vec![0, 0, 0]);
        assert_eq!(target_shard_sizes(1, &info), vec![1, 0, 0]);
    }

    #[test]
    fn balance_follows_order_and_keeps_uids() {
        let pool = NumaPool::new(4, Arc::new(BlockTopology::new(2))).unwrap();
        let mut rm = ResourceManager::for_pool(&pool);
        let uids: Vec<_> = (0..10)
            .map(|i| rm.add_agent(Cell::new([i as f64, 0.0, 0.0])))
            .collect();
        // reverse order
        let order: Vec<AgentHandle> = uids
            .iter()
            .rev()
            .map(|u| rm.agent_handle(*u).unwrap())
            .collect();
        rm.sort_and_balance_numa_nodes(&pool, &order).unwrap();

        assert_eq!(rm.num_agents_in(NumaNodeId(0)), 5);
        assert_eq!(rm.num_agents_in(NumaNodeId(1)), 5);
        assert_eq!(rm.shards()[0][0].uid(), uids[9]);
        assert_eq!(rm.shards()[1][4].uid(), uids[0]);
        assert_eq!(
            rm.agent_handle(uids[4]),
            Some(AgentHandle::new(NumaNodeId(1), 0))
        );
        rm.check_invariants().unwrap();
    }

    #[test]
    fn stale_order_is_rejected() {
        let pool = NumaPool::single_node(2).unwrap();
        let mut rm = ResourceManager::for_pool(&pool);
        rm.add_agent(Cell::new([0.0; 3]));
        rm.add_agent(Cell::new([1.0; 3]));
        let order = vec![AgentHandle::new(NumaNodeId(0), 0)];
        assert!(matches!(
            rm.sort_and_balance_numa_nodes(&pool, &order),
            Err(ResourceError::CountMismatch { .. })
        ));
        assert_eq!(rm.num_agents(), 2);
    }
}
