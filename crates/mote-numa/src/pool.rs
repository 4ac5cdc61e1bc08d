//! Fork-join executor backed by a rayon thread pool.

use std::sync::Arc;

use tracing::debug;

use crate::error::NumaError;
use crate::thread_info::ThreadInfo;
use crate::topology::{SingleNode, Topology};

/// A fixed-size worker pool together with its [`ThreadInfo`].
///
/// Every worker runs [`Topology::pin`] once when it starts.
pub struct NumaPool {
    pool: rayon::ThreadPool,
    thread_info: ThreadInfo,
    topology: Arc<dyn Topology>,
}

impl NumaPool {
    /// Build a pool of `num_threads` workers laid out by `topology`.
    pub fn new(num_threads: usize, topology: Arc<dyn Topology>) -> Result<Self, NumaError> {
        let thread_info = ThreadInfo::new(num_threads, topology.as_ref())?;
        let pin_topology = Arc::clone(&topology);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("mote-worker-{i}"))
            .start_handler(move |i| {
                let node = pin_topology.numa_node_of(i, num_threads);
                pin_topology.pin(i, node);
            })
            .build()
            .map_err(|e| NumaError::PoolBuild {
                reason: e.to_string(),
            })?;
        debug!(
            threads = num_threads,
            numa_nodes = thread_info.numa_nodes(),
            "numa pool started"
        );
        Ok(Self {
            pool,
            thread_info,
            topology,
        })
    }

    /// A pool with every thread on a single node.
    pub fn single_node(num_threads: usize) -> Result<Self, NumaError> {
        Self::new(num_threads, Arc::new(SingleNode))
    }

    /// Current topology snapshot.
    pub fn thread_info(&self) -> &ThreadInfo {
        &self.thread_info
    }

    /// Number of workers.
    pub fn num_threads(&self) -> usize {
        self.thread_info.max_threads()
    }

    /// Re-read the mapping after workers were moved to other nodes.
    pub fn renew_thread_info(&mut self, topology: Arc<dyn Topology>) -> Result<(), NumaError> {
        self.thread_info.renew(topology.as_ref())?;
        self.topology = topology;
        Ok(())
    }

    /// The topology the pool was built or last renewed with.
    pub fn topology(&self) -> &dyn Topology {
        self.topology.as_ref()
    }

    /// Run `op(tid)` once on every worker and wait for all of them.
    ///
    /// `tid` ranges over `0..num_threads()` and indexes [`ThreadInfo`].
    pub fn broadcast<F>(&self, op: F)
    where
        F: Fn(usize) + Sync,
    {
        self.pool.broadcast(|ctx| op(ctx.index()));
    }

    /// Index of the calling pool worker, or `None` outside any pool.
    pub fn current_thread_index() -> Option<usize> {
        rayon::current_thread_index()
    }

    /// Run `op` inside the pool so rayon parallel iterators use its
    /// workers.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for NumaPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumaPool")
            .field("thread_info", &self.thread_info)
            .finish_non_exhaustive()
    }
}
