//! Agent storage, identity resolution and per-iteration bookkeeping.

use mote_core::{Agent, AgentHandle, AgentUid, NumaNodeId};
use mote_numa::{NumaPool, NumaVector};
use tracing::{debug, error};

use crate::error::ResourceError;
use crate::uid_generator::AgentUidGenerator;
use crate::uid_map::AgentUidMap;

/// Owns every agent, sharded by NUMA node.
///
/// Agents are addressed permanently by [`AgentUid`] and transiently by
/// [`AgentHandle`]. Handles change on removal (the last agent of the shard
/// moves into the hole) and on rebalancing; the uid map is kept in step.
#[derive(Debug)]
pub struct ResourceManager<A> {
    pub(crate) agents: Vec<NumaVector<A>>,
    pub(crate) uid_map: AgentUidMap,
    pub(crate) uid_generator: AgentUidGenerator,
}

impl<A: Agent> ResourceManager<A> {
    /// An empty manager with one shard per NUMA node (at least one).
    pub fn new(numa_nodes: usize) -> Self {
        let agents = (0..numa_nodes.max(1))
            .map(|n| NumaVector::new(NumaNodeId(n as u16)))
            .collect();
        Self {
            agents,
            uid_map: AgentUidMap::new(AgentUidMap::INITIAL_SIZE),
            uid_generator: AgentUidGenerator::new(),
        }
    }

    /// An empty manager shaped after `pool`'s topology.
    pub fn for_pool(pool: &NumaPool) -> Self {
        Self::new(pool.thread_info().numa_nodes())
    }

    /// Number of shards.
    pub fn numa_nodes(&self) -> usize {
        self.agents.len()
    }

    /// Total number of live agents.
    pub fn num_agents(&self) -> usize {
        self.agents.iter().map(|s| s.len()).sum()
    }

    /// Number of agents stored on `node`.
    pub fn num_agents_in(&self, node: NumaNodeId) -> usize {
        self.agents.get(node.index()).map_or(0, |s| s.len())
    }

    /// `true` if no agent is stored.
    pub fn is_empty(&self) -> bool {
        self.agents.iter().all(|s| s.is_empty())
    }

    /// Per-node storage, indexed by node.
    pub fn shards(&self) -> &[NumaVector<A>] {
        &self.agents
    }

    /// The uid-to-handle map.
    pub fn uid_map(&self) -> &AgentUidMap {
        &self.uid_map
    }

    /// The uid source.
    pub fn uid_generator(&self) -> &AgentUidGenerator {
        &self.uid_generator
    }

    /// Issue a uid for an agent that will be committed later.
    ///
    /// Safe to call from parallel phases.
    pub fn generate_uid(&self) -> AgentUid {
        self.uid_generator.generate(&self.uid_map)
    }

    /// Register `agent` on node 0 under a fresh uid.
    pub fn add_agent(&mut self, agent: A) -> AgentUid {
        let uid = self.generate_uid();
        self.push_with_uid(agent, uid, 0);
        uid
    }

    /// Register `agent` on `node` under a fresh uid.
    pub fn add_agent_to(&mut self, agent: A, node: NumaNodeId) -> Result<AgentUid, ResourceError> {
        if node.index() >= self.agents.len() {
            return Err(ResourceError::NodeOutOfRange {
                node: node.index(),
                numa_nodes: self.agents.len(),
            });
        }
        let uid = self.generate_uid();
        self.push_with_uid(agent, uid, node.index());
        Ok(uid)
    }

    /// Append an agent whose uid was already issued.
    pub(crate) fn push_with_uid(&mut self, mut agent: A, uid: AgentUid, node: usize) -> AgentHandle {
        agent.set_uid(uid);
        let shard = &mut self.agents[node];
        let handle = AgentHandle::new(NumaNodeId(node as u16), shard.len() as u32);
        shard.push(agent);
        self.uid_map.insert(uid, handle);
        handle
    }

    /// Remove the agent with `uid` and return it.
    ///
    /// The shard's last agent takes the freed position; its handle is
    /// updated.
    pub fn remove_agent(&mut self, uid: AgentUid) -> Result<A, ResourceError> {
        let handle = self
            .uid_map
            .remove(uid)
            .ok_or(ResourceError::UnknownUid(uid))?;
        let node = handle.numa_node().index();
        let idx = handle.element_idx() as usize;
        let shard = &mut self.agents[node];
        if idx >= shard.len() {
            error!(%uid, %handle, "uid map points past the end of its shard");
            return Err(ResourceError::InvalidHandle(handle));
        }
        let removed = shard.swap_remove(idx);
        if let Some(moved) = shard.get(idx) {
            let moved_uid = moved.uid();
            self.uid_map.update(moved_uid, handle);
        }
        Ok(removed)
    }

    /// Handle of the agent with `uid`.
    pub fn agent_handle(&self, uid: AgentUid) -> Option<AgentHandle> {
        self.uid_map.get(uid)
    }

    /// `true` if an agent with `uid` is live.
    pub fn contains(&self, uid: AgentUid) -> bool {
        self.uid_map.contains(uid)
    }

    /// The agent with `uid`.
    pub fn get_agent(&self, uid: AgentUid) -> Option<&A> {
        self.agent_at(self.uid_map.get(uid)?)
    }

    /// Mutable access to the agent with `uid`.
    ///
    /// Changing the agent's uid through this reference breaks the map.
    pub fn get_agent_mut(&mut self, uid: AgentUid) -> Option<&mut A> {
        let handle = self.uid_map.get(uid)?;
        self.agent_at_mut(handle)
    }

    /// The agent stored at `handle`.
    pub fn agent_at(&self, handle: AgentHandle) -> Option<&A> {
        self.agents
            .get(handle.numa_node().index())?
            .get(handle.element_idx() as usize)
    }

    /// Mutable access to the agent stored at `handle`.
    pub fn agent_at_mut(&mut self, handle: AgentHandle) -> Option<&mut A> {
        self.agents
            .get_mut(handle.numa_node().index())?
            .get_mut(handle.element_idx() as usize)
    }

    /// Visit every agent sequentially, shard by shard.
    pub fn for_each_agent<F>(&self, mut f: F)
    where
        F: FnMut(&A, AgentHandle),
    {
        for (node, shard) in self.agents.iter().enumerate() {
            for (idx, agent) in shard.iter().enumerate() {
                f(agent, AgentHandle::new(NumaNodeId(node as u16), idx as u32));
            }
        }
    }

    /// Visit every agent sequentially with mutable access.
    pub fn for_each_agent_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut A, AgentHandle),
    {
        for (node, shard) in self.agents.iter_mut().enumerate() {
            for (idx, agent) in shard.iter_mut().enumerate() {
                f(agent, AgentHandle::new(NumaNodeId(node as u16), idx as u32));
            }
        }
    }

    /// Grow the uid map ahead of a batch of insertions, to
    /// `highest_index * 1.5 + 1` slots.
    pub fn resize_uid_map(&mut self) {
        let highest = self.uid_generator.highest_index() as usize;
        if highest >= self.uid_map.len() {
            let new_size = (highest as f64 * 1.5) as usize + 1;
            self.uid_map.resize(new_size);
        }
    }

    /// Switch uid defragmentation on or off from the current map
    /// utilization (`live agents / map slots`).
    ///
    /// Below `low_watermark` free slots are reused; above
    /// `high_watermark` reuse stops. Between the two the mode is left
    /// unchanged.
    pub fn end_of_iteration(&self, low_watermark: f64, high_watermark: f64) {
        let slots = self.uid_map.len().max(1);
        let utilization = self.num_agents() as f64 / slots as f64;
        let defragmenting = self.uid_generator.is_in_defragmentation_mode();
        if utilization < low_watermark {
            if !defragmenting {
                debug!(utilization, "enabling uid defragmentation");
            }
            self.uid_generator.enable_defragmentation();
        } else if utilization > high_watermark && defragmenting {
            debug!(utilization, "disabling uid defragmentation");
            self.uid_generator.disable_defragmentation();
        }
    }

    /// Verify that shard sizes, the uid map and stored uids agree.
    pub fn check_invariants(&self) -> Result<(), ResourceError> {
        let total = self.num_agents();
        if total != self.uid_map.live() {
            error!(total, live = self.uid_map.live(), "shard sizes disagree with uid map");
            return Err(ResourceError::CountMismatch {
                context: "uid map population",
                expected: total,
                actual: self.uid_map.live(),
            });
        }
        let mut result = Ok(());
        self.for_each_agent(|agent, handle| {
            if result.is_ok() && self.uid_map.get(agent.uid()) != Some(handle) {
                result = Err(ResourceError::InvalidHandle(handle));
            }
        });
        result
    }

    /// Remove every agent. Issued uids are not recycled by the counter.
    pub fn clear(&mut self) {
        for shard in &mut self.agents {
            shard.clear();
        }
        self.uid_map.clear();
    }

    /// Rebuild the uid map from the shards' current contents.
    pub(crate) fn rebuild_uid_map(&mut self) {
        let mut map = std::mem::take(&mut self.uid_map);
        map.clear();
        map.resize(self.uid_generator.highest_index() as usize);
        for (node, shard) in self.agents.iter().enumerate() {
            for (idx, agent) in shard.iter().enumerate() {
                map.insert(agent.uid(), AgentHandle::new(NumaNodeId(node as u16), idx as u32));
            }
        }
        self.uid_map = map;
    }

    /// Copy every shard, each copy written by its own node's threads.
    ///
    /// The copy has the same layout, so handles resolve to the same agent
    /// in both until the next structural change.
    pub fn snapshot(&self, pool: &NumaPool) -> Result<AgentSnapshot<A>, ResourceError> {
        let mut shards: Vec<NumaVector<A>> = self
            .agents
            .iter()
            .map(|s| NumaVector::with_capacity(s.numa_node(), s.len()))
            .collect();
        let lens: Vec<usize> = self.agents.iter().map(|s| s.len()).collect();
        NumaVector::fill_all_parallel(pool, &mut shards, &lens, |node, range, emit| {
            for agent in &self.agents[node][range] {
                emit(agent.clone());
            }
        })?;
        Ok(AgentSnapshot { shards })
    }
}

/// A read-only copy of all shards, taken at the start of a parallel phase.
///
/// Operations read neighbors from the snapshot while writing to the live
/// agents, so no thread ever reads an agent another thread is writing.
#[derive(Debug)]
pub struct AgentSnapshot<A> {
    shards: Vec<NumaVector<A>>,
}

impl<A> AgentSnapshot<A> {
    /// Per-node storage, indexed by node.
    pub fn shards(&self) -> &[NumaVector<A>] {
        &self.shards
    }

    /// Agent stored at `handle`.
    pub fn agent_at(&self, handle: AgentHandle) -> Option<&A> {
        self.shards
            .get(handle.numa_node().index())?
            .get(handle.element_idx() as usize)
    }

    /// Total number of agents.
    pub fn num_agents(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }
}
