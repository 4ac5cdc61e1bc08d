//! Parallel traversal of all agents.
//!
//! Two strategies are provided and neither supersedes the other:
//!
//! - **Static**: each shard is split into `ceil(len / threads_on_node)`
//!   sized chunks and each thread processes exactly one chunk of its own
//!   node's shard. No coordination, no balancing.
//! - **Dynamic**: shards are cut into small chunks, handed out through
//!   per-thread atomic counters. A thread drains its own range first,
//!   then steals from the other threads of its node, then from the other
//!   nodes in round-robin order.
//!
//! Both visit every agent exactly once. Visitation order is unspecified.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use mote_core::{Agent, AgentHandle, NumaNodeId};
use mote_numa::{static_chunk_range, NumaPool, ThreadInfo};

use crate::error::ResourceError;
use crate::manager::ResourceManager;

/// How a parallel traversal distributes agents over threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationStrategy {
    /// One contiguous chunk per thread, within the thread's own node.
    Static,
    /// Chunks of about `batch_size` agents claimed dynamically, with
    /// work stealing across nodes.
    Dynamic {
        /// Requested chunk size. Adapted downwards for small populations.
        batch_size: usize,
    },
}

impl Default for IterationStrategy {
    fn default() -> Self {
        Self::Dynamic { batch_size: 1000 }
    }
}

/// Chunk bookkeeping for one dynamic traversal.
///
/// Node `n`'s shard is cut into `ceil(len_n / chunk)` chunks. Those chunk
/// indices are split statically among the node's threads; each thread
/// owns an atomic cursor over its part. Claiming a chunk is a single
/// `fetch_add` on some thread's cursor, so every chunk is claimed by
/// exactly one thread.
#[derive(Debug)]
pub struct DynamicPlan {
    chunk: usize,
    chunks_per_numa: Vec<usize>,
    cursors: Vec<AtomicUsize>,
    ends: Vec<usize>,
}

impl DynamicPlan {
    /// Shrink `requested` so that each thread gets several chunks when
    /// the population is small. Never returns 0.
    pub fn adapt_chunk(num_agents: usize, max_threads: usize, requested: usize) -> usize {
        let requested = requested.max(1);
        let per_thread = num_agents / max_threads.max(1);
        let factor = per_thread / requested;
        (per_thread / (factor + 1)).max(1)
    }

    /// Plan a traversal over shards of the given sizes.
    pub fn new(shard_sizes: &[usize], info: &ThreadInfo, chunk: usize) -> Self {
        let chunk = chunk.max(1);
        let chunks_per_numa: Vec<usize> = shard_sizes.iter().map(|s| s.div_ceil(chunk)).collect();
        let mut cursors = Vec::with_capacity(info.max_threads());
        let mut ends = Vec::with_capacity(info.max_threads());
        for tid in 0..info.max_threads() {
            let node = info.numa_node(tid);
            let chunks = chunks_per_numa.get(node.index()).copied().unwrap_or(0);
            let own = static_chunk_range(chunks, info.threads_in_numa_node(node), info.numa_thread_id(tid));
            cursors.push(AtomicUsize::new(own.start));
            ends.push(own.end);
        }
        Self {
            chunk,
            chunks_per_numa,
            cursors,
            ends,
        }
    }

    /// Effective chunk size.
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Number of chunks in node `node`'s shard.
    pub fn chunks_in(&self, node: NumaNodeId) -> usize {
        self.chunks_per_numa.get(node.index()).copied().unwrap_or(0)
    }

    fn claim(&self, owner: usize) -> Option<usize> {
        if self.cursors[owner].load(Ordering::Relaxed) >= self.ends[owner] {
            return None;
        }
        let idx = self.cursors[owner].fetch_add(1, Ordering::Relaxed);
        (idx < self.ends[owner]).then_some(idx)
    }

    /// Claim the next chunk for thread `tid`: its own range first, then
    /// other threads' ranges, visiting nodes `(own + k) % nodes` and
    /// threads `(tid + t) % max_threads`.
    pub fn next(&self, tid: usize, info: &ThreadInfo) -> Option<(NumaNodeId, usize)> {
        let own_node = info.numa_node(tid);
        if let Some(idx) = self.claim(tid) {
            return Some((own_node, idx));
        }
        let nodes = info.numa_nodes();
        let max = info.max_threads();
        for k in 0..nodes {
            let node = NumaNodeId(((own_node.index() + k) % nodes) as u16);
            for t in 1..=max {
                let victim = (tid + t) % max;
                if info.numa_node(victim) != node {
                    continue;
                }
                if let Some(idx) = self.claim(victim) {
                    return Some((node, idx));
                }
            }
        }
        None
    }

    /// Element range of chunk `idx` in a shard of `len` elements.
    pub fn chunk_range(&self, idx: usize, len: usize) -> Range<usize> {
        let start = (idx * self.chunk).min(len);
        start..(start + self.chunk).min(len)
    }
}

type ChunkSlot<'a, A> = Mutex<Option<&'a mut [A]>>;

fn handle(node: usize, idx: usize) -> AgentHandle {
    AgentHandle::new(NumaNodeId(node as u16), idx as u32)
}

impl<A: Agent> ResourceManager<A> {
    fn check_topology(&self, info: &ThreadInfo) -> Result<(), ResourceError> {
        if self.agents.len() != info.numa_nodes() {
            tracing::error!(
                shards = self.agents.len(),
                numa_nodes = info.numa_nodes(),
                "shard count does not match pool topology"
            );
            return Err(ResourceError::ShardMismatch {
                shards: self.agents.len(),
                numa_nodes: info.numa_nodes(),
            });
        }
        Ok(())
    }

    /// Chunk size a dynamic traversal with `batch_size` would use.
    pub fn dynamic_chunk(&self, info: &ThreadInfo, batch_size: usize) -> usize {
        DynamicPlan::adapt_chunk(self.num_agents(), info.max_threads(), batch_size)
    }

    /// Apply `f` to every agent, static scheduling.
    pub fn apply_on_all_elements_parallel<F>(&mut self, pool: &NumaPool, f: F) -> Result<(), ResourceError>
    where
        F: Fn(&mut A, AgentHandle) + Sync,
    {
        let info = pool.thread_info();
        self.check_topology(info)?;
        // slots[node][numa_thread_id]
        let slots: Vec<Vec<(usize, ChunkSlot<'_, A>)>> = self
            .agents
            .iter_mut()
            .enumerate()
            .map(|(node, shard)| {
                let threads = info.threads_in_numa_node(NumaNodeId(node as u16));
                let mut rest: &mut [A] = shard;
                let len = rest.len();
                (0..threads)
                    .map(|part| {
                        let range = static_chunk_range(len, threads, part);
                        let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
                        rest = tail;
                        (range.start, Mutex::new(Some(head)))
                    })
                    .collect()
            })
            .collect();

        pool.broadcast(|tid| {
            let node = info.numa_node(tid).index();
            let (start, slot) = &slots[node][info.numa_thread_id(tid)];
            let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(chunk) = taken {
                for (k, agent) in chunk.iter_mut().enumerate() {
                    f(agent, handle(node, start + k));
                }
            }
        });
        Ok(())
    }

    /// Visit every agent read-only, static scheduling.
    pub fn for_each_agent_parallel<F>(&self, pool: &NumaPool, f: F) -> Result<(), ResourceError>
    where
        F: Fn(&A, AgentHandle) + Sync,
    {
        let info = pool.thread_info();
        self.check_topology(info)?;
        pool.broadcast(|tid| {
            let node = info.numa_node(tid);
            let shard = &self.agents[node.index()];
            let range = static_chunk_range(
                shard.len(),
                info.threads_in_numa_node(node),
                info.numa_thread_id(tid),
            );
            for i in range {
                f(&shard[i], handle(node.index(), i));
            }
        });
        Ok(())
    }

    /// Apply `f` to every agent, dynamic scheduling with work stealing.
    ///
    /// `batch_size` is adapted with [`DynamicPlan::adapt_chunk`].
    pub fn apply_on_all_elements_parallel_dynamic<F>(
        &mut self,
        pool: &NumaPool,
        batch_size: usize,
        f: F,
    ) -> Result<(), ResourceError>
    where
        F: Fn(&mut A, AgentHandle) + Sync,
    {
        let info = pool.thread_info();
        self.check_topology(info)?;
        let chunk = self.dynamic_chunk(info, batch_size);
        let sizes: Vec<usize> = self.agents.iter().map(|s| s.len()).collect();
        let plan = DynamicPlan::new(&sizes, info, chunk);
        let slots: Vec<Vec<ChunkSlot<'_, A>>> = self
            .agents
            .iter_mut()
            .map(|shard| shard.chunks_mut(chunk).map(|c| Mutex::new(Some(c))).collect())
            .collect();

        pool.broadcast(|tid| {
            while let Some((node, idx)) = plan.next(tid, info) {
                let taken = slots[node.index()][idx]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(agents) = taken {
                    let start = idx * chunk;
                    for (k, agent) in agents.iter_mut().enumerate() {
                        f(agent, handle(node.index(), start + k));
                    }
                }
            }
        });
        Ok(())
    }

    /// Visit every agent read-only, dynamic scheduling with work stealing.
    pub fn for_each_agent_parallel_dynamic<F>(
        &self,
        pool: &NumaPool,
        batch_size: usize,
        f: F,
    ) -> Result<(), ResourceError>
    where
        F: Fn(&A, AgentHandle) + Sync,
    {
        let info = pool.thread_info();
        self.check_topology(info)?;
        let chunk = self.dynamic_chunk(info, batch_size);
        let sizes: Vec<usize> = self.agents.iter().map(|s| s.len()).collect();
        let plan = DynamicPlan::new(&sizes, info, chunk);
        pool.broadcast(|tid| {
            while let Some((node, idx)) = plan.next(tid, info) {
                let shard = &self.agents[node.index()];
                for i in plan.chunk_range(idx, shard.len()) {
                    f(&shard[i], handle(node.index(), i));
                }
            }
        });
        Ok(())
    }

    /// Apply `f` to every agent with the given strategy.
    pub fn apply_parallel<F>(
        &mut self,
        pool: &NumaPool,
        strategy: IterationStrategy,
        f: F,
    ) -> Result<(), ResourceError>
    where
        F: Fn(&mut A, AgentHandle) + Sync,
    {
        match strategy {
            IterationStrategy::Static => self.apply_on_all_elements_parallel(pool, f),
            IterationStrategy::Dynamic { batch_size } => {
                self.apply_on_all_elements_parallel_dynamic(pool, batch_size, f)
            }
        }
    }

    /// Visit every agent read-only with the given strategy.
    pub fn for_each_parallel<F>(
        &self,
        pool: &NumaPool,
        strategy: IterationStrategy,
        f: F,
    ) -> Result<(), ResourceError>
    where
        F: Fn(&A, AgentHandle) + Sync,
    {
        match strategy {
            IterationStrategy::Static => self.for_each_agent_parallel(pool, f),
            IterationStrategy::Dynamic { batch_size } => {
                self.for_each_agent_parallel_dynamic(pool, batch_size, f)
            }
        }
    }
}
