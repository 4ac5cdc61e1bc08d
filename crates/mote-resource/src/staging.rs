//! Structural changes requested during parallel phases.
//!
//! Compute phases never mutate storage. Agents created or removed by an
//! operation are staged here: new agents in per-thread buffers, removals
//! through a channel. [`ResourceManager::commit`] applies both in a
//! single-writer phase once the parallel phase is over.

use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use mote_core::{exclusive_prefix_sum, Agent, AgentHandle, AgentUid, NumaNodeId};
use mote_numa::{NumaPool, ThreadInfo};
use tracing::{debug, warn};

use crate::error::ResourceError;
use crate::manager::ResourceManager;

/// Births and removals waiting for the next commit.
#[derive(Debug)]
pub struct StagedChanges<A> {
    // Indexed by pool thread id; the last buffer collects agents staged
    // from outside the pool.
    new_agents: Vec<Mutex<Vec<A>>>,
    removal_tx: Sender<AgentUid>,
    removal_rx: Receiver<AgentUid>,
}

impl<A: Agent> StagedChanges<A> {
    /// Buffers for a pool of `max_threads` threads.
    pub fn new(max_threads: usize) -> Self {
        let (removal_tx, removal_rx) = crossbeam_channel::unbounded();
        Self {
            new_agents: (0..=max_threads).map(|_| Mutex::new(Vec::new())).collect(),
            removal_tx,
            removal_rx,
        }
    }

    /// Queue `agent` for insertion.
    ///
    /// An agent whose uid is still [`AgentUid::default_unassigned`] gets
    /// one at commit. The agent will be stored on the NUMA node of the
    /// calling thread.
    pub fn stage_new(&self, agent: A) {
        let last = self.new_agents.len() - 1;
        let slot = NumaPool::current_thread_index().map_or(last, |t| t.min(last));
        self.new_agents[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(agent);
    }

    /// Queue the agent with `uid` for removal.
    pub fn stage_removal(&self, uid: AgentUid) {
        // The receiver lives in `self`, so the channel cannot be
        // disconnected here.
        let _ = self.removal_tx.send(uid);
    }

    /// Number of agents waiting for insertion.
    pub fn pending_new(&self) -> usize {
        self.new_agents
            .iter()
            .map(|b| b.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Number of removals waiting.
    pub fn pending_removals(&self) -> usize {
        self.removal_rx.len()
    }
}

/// What a commit changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Agents inserted.
    pub added: usize,
    /// Agents removed.
    pub removed: usize,
    /// Removals of uids that were not live (already removed, or removed
    /// twice in one step).
    pub ignored_removals: usize,
}

impl<A: Agent> ResourceManager<A> {
    /// Apply staged insertions, then staged removals.
    ///
    /// Insertions of each node are laid out after the shard's current end,
    /// thread by thread, at offsets given by an exclusive prefix sum over
    /// the per-thread counts.
    pub fn commit(
        &mut self,
        staged: &StagedChanges<A>,
        info: &ThreadInfo,
    ) -> Result<CommitSummary, ResourceError> {
        let mut summary = CommitSummary::default();

        let mut batches: Vec<Vec<A>> = staged
            .new_agents
            .iter()
            .map(|b| std::mem::take(&mut *b.lock().unwrap_or_else(PoisonError::into_inner)))
            .collect();
        if batches.iter().any(|b| !b.is_empty()) {
            self.resize_uid_map();
        }
        let nodes = self.agents.len();
        let node_of = |tid: usize| -> usize {
            if tid < info.max_threads() {
                info.numa_node(tid).index().min(nodes - 1)
            } else {
                0
            }
        };

        for node in 0..nodes {
            let contributors: Vec<usize> = (0..batches.len())
                .filter(|&t| node_of(t) == node && !batches[t].is_empty())
                .collect();
            if contributors.is_empty() {
                continue;
            }
            let mut offsets: Vec<usize> = contributors.iter().map(|&t| batches[t].len()).collect();
            let total = exclusive_prefix_sum(&mut offsets);
            let base = self.agents[node].len();
            self.agents[node].reserve(base + total);
            for (&tid, &offset) in contributors.iter().zip(&offsets) {
                for (k, mut agent) in std::mem::take(&mut batches[tid]).into_iter().enumerate() {
                    if agent.uid() == AgentUid::default_unassigned() {
                        agent.set_uid(self.uid_generator.generate(&self.uid_map));
                    }
                    let handle = AgentHandle::new(NumaNodeId(node as u16), (base + offset + k) as u32);
                    self.uid_map.insert(agent.uid(), handle);
                    self.agents[node].push(agent);
                }
            }
            summary.added += total;
        }

        for uid in staged.removal_rx.try_iter() {
            match self.remove_agent(uid) {
                Ok(_) => summary.removed += 1,
                Err(ResourceError::UnknownUid(_)) => {
                    warn!(%uid, "ignoring removal of an agent that is not live");
                    summary.ignored_removals += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let total = self.num_agents();
        if total != self.uid_map.live() {
            tracing::error!(total, live = self.uid_map.live(), "commit broke shard accounting");
            return Err(ResourceError::CountMismatch {
                context: "commit",
                expected: total,
                actual: self.uid_map.live(),
            });
        }
        if summary != CommitSummary::default() {
            debug!(
                added = summary.added,
                removed = summary.removed,
                agents = total,
                "committed structural changes"
            );
        }
        Ok(summary)
    }
}
