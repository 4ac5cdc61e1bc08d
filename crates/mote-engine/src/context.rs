//! Execution contexts handed to operations.
//!
//! [`SimContext`] is the explicit replacement for global simulation
//! state: standalone operations receive it with exclusive access to the
//! resource manager, grid, RNG and diffusion grids. [`AgentContext`] is
//! its shared, read-only counterpart for agent operations running in a
//! parallel phase.

use mote_core::{Agent, AgentHandle, AgentUid, StepId};
use mote_numa::NumaPool;
use mote_resource::{AgentSnapshot, CommitSummary, ResourceManager, StagedChanges};
use mote_space::UniformGrid;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::SimulationError;
use crate::ops::DiffusionGrid;
use crate::param::Param;

/// Uniform sample from `[min, max)`.
pub fn uniform(rng: &mut impl RngCore, min: f64, max: f64) -> f64 {
    let unit = (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64);
    min + unit * (max - min)
}

/// The RNG stream of agent `uid` at `step`.
///
/// Derived from the simulation seed only, so an agent draws the same
/// numbers whichever thread processes it.
pub fn agent_rng(seed: u64, step: StepId, uid: AgentUid) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ step.0.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    rng.set_stream((u64::from(uid.index()) << 32) | u64::from(uid.reused()));
    rng
}

// ── AgentContext ────────────────────────────────────────────────

/// Read-only view of the simulation during an agent phase.
pub struct AgentContext<'a, A> {
    snapshot: &'a AgentSnapshot<A>,
    grid: &'a UniformGrid,
    staged: &'a StagedChanges<A>,
    param: &'a Param,
    step: StepId,
}

impl<'a, A: Agent> AgentContext<'a, A> {
    pub(crate) fn new(
        snapshot: &'a AgentSnapshot<A>,
        grid: &'a UniformGrid,
        staged: &'a StagedChanges<A>,
        param: &'a Param,
        step: StepId,
    ) -> Self {
        Self {
            snapshot,
            grid,
            staged,
            param,
            step,
        }
    }

    /// Simulation parameters.
    pub fn param(&self) -> &Param {
        self.param
    }

    /// The grid, as built at the start of the step.
    pub fn grid(&self) -> &UniformGrid {
        self.grid
    }

    /// Current step.
    pub fn step(&self) -> StepId {
        self.step
    }

    /// Agent state at the start of the phase.
    pub fn snapshot(&self) -> &AgentSnapshot<A> {
        self.snapshot
    }

    /// Agent at `handle` in the snapshot.
    pub fn agent_at(&self, handle: AgentHandle) -> Option<&A> {
        self.snapshot.agent_at(handle)
    }

    /// Call `f(neighbor, handle, squared_distance)` for every agent within
    /// `squared_radius` of `agent`, excluding `agent` itself.
    pub fn for_each_neighbor<F>(&self, agent: &A, squared_radius: f64, f: F)
    where
        F: FnMut(&A, AgentHandle, f64),
    {
        self.grid
            .for_each_neighbor_within_radius(self.snapshot.shards(), agent, squared_radius, f);
    }

    /// Uids of the neighbors of `agent` within `squared_radius`, sorted.
    pub fn neighbor_uids(&self, agent: &A, squared_radius: f64) -> Vec<AgentUid> {
        self.grid
            .neighbor_uids(self.snapshot.shards(), agent, squared_radius)
    }

    /// Stage a new agent. It is inserted, and given a uid, at the next
    /// commit.
    pub fn new_agent(&self, mut agent: A) {
        agent.set_uid(AgentUid::default_unassigned());
        self.staged.stage_new(agent);
    }

    /// Stage the removal of the agent with `uid`.
    pub fn remove_agent(&self, uid: AgentUid) {
        self.staged.stage_removal(uid);
    }

    /// Deterministic RNG for agent `uid` at this step.
    pub fn rng_for(&self, uid: AgentUid) -> ChaCha8Rng {
        agent_rng(self.param.random_seed, self.step, uid)
    }
}

// ── SimContext ──────────────────────────────────────────────────

/// Exclusive access to the simulation for standalone operations.
pub struct SimContext<'a, A> {
    pub(crate) rm: &'a mut ResourceManager<A>,
    pub(crate) grid: &'a mut UniformGrid,
    pub(crate) pool: &'a NumaPool,
    pub(crate) param: &'a Param,
    pub(crate) staged: &'a StagedChanges<A>,
    pub(crate) rng: &'a mut ChaCha8Rng,
    pub(crate) diffusion_grids: &'a mut Vec<Box<dyn DiffusionGrid>>,
    pub(crate) committed: &'a mut CommitSummary,
    pub(crate) step: StepId,
    pub(crate) simulated_time: f64,
}

impl<A: Agent> SimContext<'_, A> {
    /// Agent storage.
    pub fn resource_manager(&self) -> &ResourceManager<A> {
        self.rm
    }

    /// Mutable agent storage.
    pub fn resource_manager_mut(&mut self) -> &mut ResourceManager<A> {
        self.rm
    }

    /// The spatial grid.
    pub fn grid(&self) -> &UniformGrid {
        self.grid
    }

    /// The worker pool.
    pub fn pool(&self) -> &NumaPool {
        self.pool
    }

    /// Simulation parameters.
    pub fn param(&self) -> &Param {
        self.param
    }

    /// Births and removals waiting for the next commit.
    pub fn staged(&self) -> &StagedChanges<A> {
        self.staged
    }

    /// The simulation RNG.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.rng
    }

    /// Current step.
    pub fn step(&self) -> StepId {
        self.step
    }

    /// Simulated time at the start of the step.
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    /// Registered diffusion grids.
    pub fn diffusion_grids_mut(&mut self) -> &mut [Box<dyn DiffusionGrid>] {
        self.diffusion_grids
    }

    /// Rebuild the grid from the current agent positions.
    pub fn update_environment(&mut self) -> Result<(), SimulationError> {
        self.grid.update(self.rm, self.pool)?;
        Ok(())
    }

    /// Apply staged births and removals, then adjust uid reuse to the
    /// new utilization.
    pub fn commit(&mut self) -> Result<CommitSummary, SimulationError> {
        let summary = self.rm.commit(self.staged, self.pool.thread_info())?;
        self.committed.added += summary.added;
        self.committed.removed += summary.removed;
        self.committed.ignored_removals += summary.ignored_removals;
        self.rm.end_of_iteration(
            self.param.agent_uid_defragmentation_low_watermark,
            self.param.agent_uid_defragmentation_high_watermark,
        );
        Ok(summary)
    }

    /// Reorder agents along the grid's Z-order and spread them over the
    /// NUMA nodes.
    pub fn balance(&mut self) -> Result<(), SimulationError> {
        if self.rm.is_empty() {
            return Ok(());
        }
        let order = self.grid.z_order();
        self.rm.sort_and_balance_numa_nodes(self.pool, &order)?;
        Ok(())
    }
}
