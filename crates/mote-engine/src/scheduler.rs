//! The simulation loop.
//!
//! [`Scheduler`] owns the agents, the grid and the worker pool, and runs
//! the operation pipeline once per step:
//!
//! 1. apply queued schedule and unschedule requests,
//! 2. pre-stage standalone operations (commit, grid rebuild),
//! 3. the agent phase: `set_up` hooks, parallel agent operations,
//!    `tear_down` hooks,
//! 4. main-stage standalone operations,
//! 5. post-stage standalone operations (rebalance, commit),
//!
//! then advances the step counter and the simulated time. Within a stage,
//! operations run in the order they were scheduled.
//!
//! # Ownership model
//!
//! `Scheduler` is [`Send`] but every mutating method takes `&mut self`;
//! operations reach the simulation only through the contexts the
//! scheduler lends them for the duration of a call.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use mote_core::{Agent, AgentUid, StepId};
use mote_numa::{BlockTopology, NumaPool};
use mote_resource::{CommitSummary, ResourceManager, StagedChanges};
use mote_space::UniformGrid;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, debug_span, info, warn};

use crate::context::{AgentContext, SimContext};
use crate::error::{ScheduleError, SimulationError};
use crate::metrics::StepMetrics;
use crate::operation::{AgentOperation, OpSpec, OpStage, Operation};
use crate::ops::{
    BoundSpaceOp, DiffusionGrid, DiffusionOp, LoadBalancingOp, MechanicalForcesOp,
    SetUpIterationOp, TearDownIterationOp, UpdateEnvironmentOp, PROTECTED_OPS,
};
use crate::param::{ExecutionOrder, Param};

// Fails to compile if any field is !Send.
const _: () = {
    #[allow(dead_code)]
    fn assert_send<T: Send>() {}
    #[allow(dead_code)]
    fn check() {
        assert_send::<Scheduler<mote_core::Cell>>();
    }
};

// ── SchedulerState ──────────────────────────────────────────────

/// Lifecycle of a [`Scheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchedulerState {
    /// Built; agents can be added and operations scheduled.
    Uninitialized,
    /// Initial commit done and grid built.
    Initialized,
    /// At least one call to a `simulate` method.
    Running,
    /// Finished; no further steps can run.
    Terminated,
}

// ── World ───────────────────────────────────────────────────────

/// Everything operations act on.
struct World<A> {
    param: Param,
    pool: NumaPool,
    rm: ResourceManager<A>,
    grid: UniformGrid,
    staged: StagedChanges<A>,
    rng: ChaCha8Rng,
    diffusion_grids: Vec<Box<dyn DiffusionGrid>>,
    committed: CommitSummary,
}

impl<A: Agent> World<A> {
    fn context(&mut self, step: StepId, simulated_time: f64) -> SimContext<'_, A> {
        SimContext {
            rm: &mut self.rm,
            grid: &mut self.grid,
            pool: &self.pool,
            param: &self.param,
            staged: &self.staged,
            rng: &mut self.rng,
            diffusion_grids: &mut self.diffusion_grids,
            committed: &mut self.committed,
            step,
            simulated_time,
        }
    }

    /// One parallel pass applying `ops` in turn to every agent. Reads go
    /// to a snapshot taken at the start of the pass.
    fn agent_pass(&mut self, ops: &[&dyn AgentOperation<A>], step: StepId) -> Result<(), SimulationError> {
        let snapshot = self.rm.snapshot(&self.pool)?;
        let ctx = AgentContext::new(&snapshot, &self.grid, &self.staged, &self.param, step);
        let strategy = self.param.iteration_strategy;
        self.rm.apply_parallel(&self.pool, strategy, |agent, _| {
            for op in ops {
                op.run(agent, &ctx);
            }
        })?;
        Ok(())
    }

    fn bound_all(&mut self) -> Result<(), SimulationError> {
        let mode = self.param.bound_space;
        if !mode.is_bounded() {
            return Ok(());
        }
        let (min, max) = (self.param.min_bound, self.param.max_bound);
        self.rm
            .apply_parallel(&self.pool, self.param.iteration_strategy, |agent, _| {
                let position = agent.position();
                let bounded = mode.apply(position, min, max);
                if bounded != position {
                    agent.set_position(bounded);
                }
            })?;
        Ok(())
    }
}

// ── Scheduler ───────────────────────────────────────────────────

struct Entry<A: Agent> {
    spec: OpSpec,
    op: Operation<A>,
}

enum Request<A: Agent> {
    Schedule(String, Entry<A>),
    Unschedule(String),
}

/// Drives a simulation of agents of type `A`.
///
/// # Example
///
/// ```
/// use mote_core::Cell;
/// use mote_engine::{Param, Scheduler};
///
/// let param = Param { num_threads: 2, ..Param::default() };
/// let mut sim = Scheduler::new(param).unwrap();
/// sim.add_agent(Cell::new([0.0, 0.0, 0.0]));
/// sim.add_agent(Cell::new([5.0, 0.0, 0.0]));
/// sim.simulate(10).unwrap();
/// assert_eq!(sim.total_steps(), 10);
/// ```
pub struct Scheduler<A: Agent> {
    world: World<A>,
    ops: IndexMap<String, Entry<A>>,
    pending: Vec<Request<A>>,
    state: SchedulerState,
    total_steps: u64,
    simulated_time: f64,
    last_metrics: StepMetrics,
}

impl<A: Agent> Scheduler<A> {
    /// Validate `param`, start the worker pool and schedule the default
    /// operations not listed in
    /// [`Param::unschedule_default_operations`].
    ///
    /// Workers are split over `param.numa_nodes` nodes in contiguous
    /// blocks.
    pub fn new(param: Param) -> Result<Self, SimulationError> {
        param.validate()?;
        let pool = NumaPool::new(param.num_threads, Arc::new(BlockTopology::new(param.numa_nodes)))?;
        let world = World {
            rm: ResourceManager::for_pool(&pool),
            staged: StagedChanges::new(pool.num_threads()),
            grid: UniformGrid::new(param.grid_config()),
            rng: ChaCha8Rng::seed_from_u64(param.random_seed),
            diffusion_grids: Vec::new(),
            committed: CommitSummary::default(),
            pool,
            param,
        };
        let mut scheduler = Self {
            world,
            ops: IndexMap::new(),
            pending: Vec::new(),
            state: SchedulerState::Uninitialized,
            total_steps: 0,
            simulated_time: 0.0,
            last_metrics: StepMetrics::default(),
        };
        scheduler.schedule_defaults();
        Ok(scheduler)
    }

    fn schedule_defaults(&mut self) {
        let balance_every = self.world.param.load_balancing_frequency;
        let defaults: [(Operation<A>, OpSpec); 7] = [
            (Operation::standalone(SetUpIterationOp), OpSpec::pre()),
            (Operation::standalone(UpdateEnvironmentOp), OpSpec::pre()),
            (Operation::agent(BoundSpaceOp), OpSpec::main()),
            (Operation::agent(MechanicalForcesOp::default()), OpSpec::main()),
            (Operation::standalone(DiffusionOp), OpSpec::main()),
            (
                Operation::standalone(LoadBalancingOp),
                OpSpec::post().with_frequency(balance_every),
            ),
            (Operation::standalone(TearDownIterationOp), OpSpec::post()),
        ];
        for (op, spec) in defaults {
            let name = op.name().to_string();
            let spec = if PROTECTED_OPS.contains(&name.as_str()) {
                spec.protected()
            } else {
                spec
            };
            if self.world.param.unschedule_default_operations.contains(&name) {
                if spec.protected {
                    warn!(op = %name, "protected operation cannot be unscheduled");
                } else {
                    debug!(op = %name, "default operation left unscheduled");
                    continue;
                }
            }
            self.ops.insert(name, Entry { spec, op });
        }
    }

    // ── Population ──────────────────────────────────────────────

    /// Insert `agent` immediately and return its uid.
    ///
    /// Agents added after initialization enter the grid at the next
    /// step's rebuild.
    pub fn add_agent(&mut self, agent: A) -> AgentUid {
        self.world.rm.add_agent(agent)
    }

    /// Register a diffusion grid. It is initialized with the agent grid's
    /// dimensions right away if the simulation is already initialized,
    /// otherwise during [`initialize()`](Self::initialize).
    pub fn register_diffusion_grid(&mut self, grid: impl DiffusionGrid + 'static) {
        let mut grid: Box<dyn DiffusionGrid> = Box::new(grid);
        if self.world.grid.is_initialized() {
            grid.initialize(self.world.grid.dimensions());
        }
        debug!(substance = grid.substance(), "diffusion grid registered");
        self.world.diffusion_grids.push(grid);
    }

    // ── Operations ──────────────────────────────────────────────

    /// Queue `op` for scheduling. It joins the pipeline at the start of
    /// the next step, after the operations already in its stage.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::DuplicateOp`] if an operation with the same name
    /// is or will be scheduled, [`ScheduleError::AgentOpOutsideMain`] for
    /// an agent operation outside [`OpStage::Main`].
    pub fn schedule_op(&mut self, op: Operation<A>, spec: OpSpec) -> Result<(), ScheduleError> {
        let name = op.name().to_string();
        if op.is_agent() && spec.stage != OpStage::Main {
            return Err(ScheduleError::AgentOpOutsideMain { name });
        }
        if self.pending_spec(&name).is_some() {
            return Err(ScheduleError::DuplicateOp { name });
        }
        self.pending.push(Request::Schedule(name, Entry { spec, op }));
        Ok(())
    }

    /// Queue the removal of operation `name` at the start of the next
    /// step. Protected operations stay scheduled; the request is logged
    /// and ignored.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::UnknownOp`] if no operation of that name is or
    /// will be scheduled.
    pub fn unschedule_op(&mut self, name: &str) -> Result<(), ScheduleError> {
        let Some(spec) = self.pending_spec(name) else {
            return Err(ScheduleError::UnknownOp { name: name.to_string() });
        };
        if spec.protected {
            warn!(op = name, "protected operation cannot be unscheduled");
            return Ok(());
        }
        self.pending.push(Request::Unschedule(name.to_string()));
        Ok(())
    }

    /// Spec of `name` once queued requests are applied.
    fn pending_spec(&self, name: &str) -> Option<OpSpec> {
        for request in self.pending.iter().rev() {
            match request {
                Request::Schedule(n, entry) if n == name => return Some(entry.spec),
                Request::Unschedule(n) if n == name => return None,
                _ => {}
            }
        }
        self.ops.get(name).map(|e| e.spec)
    }

    fn apply_pending(&mut self) {
        for request in mem::take(&mut self.pending) {
            match request {
                Request::Schedule(name, entry) => {
                    debug!(op = %name, "operation scheduled");
                    self.ops.insert(name, entry);
                }
                Request::Unschedule(name) => {
                    debug!(op = %name, "operation unscheduled");
                    self.ops.shift_remove(&name);
                }
            }
        }
    }

    /// Names of the scheduled operations in execution order within each
    /// stage. Queued requests are not reflected until the next step.
    pub fn scheduled_op_names(&self) -> Vec<&str> {
        self.ops.keys().map(String::as_str).collect()
    }

    /// Scheduling metadata of the scheduled operation `name`.
    pub fn op_spec(&self, name: &str) -> Option<OpSpec> {
        self.ops.get(name).map(|e| e.spec)
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Prepare the first step: apply queued requests, commit staged
    /// agents, bring them inside a closed or toroidal domain, build the
    /// grid and size the diffusion grids.
    ///
    /// Called by the `simulate` methods when needed. Does nothing once
    /// initialized.
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        match self.state {
            SchedulerState::Terminated => return Err(SimulationError::Terminated),
            SchedulerState::Initialized | SchedulerState::Running => return Ok(()),
            SchedulerState::Uninitialized => {}
        }
        self.apply_pending();
        let world = &mut self.world;
        world.context(StepId(self.total_steps), self.simulated_time).commit()?;
        world.bound_all()?;
        world.grid.update(&mut world.rm, &world.pool)?;
        let dimensions = world.grid.dimensions();
        for grid in &mut world.diffusion_grids {
            grid.initialize(dimensions);
        }
        world.committed = CommitSummary::default();
        info!(
            agents = world.rm.num_agents(),
            threads = world.pool.num_threads(),
            numa_nodes = world.rm.numa_nodes(),
            box_length = world.grid.box_length(),
            "simulation initialized"
        );
        self.state = SchedulerState::Initialized;
        Ok(())
    }

    /// Run `steps` steps.
    ///
    /// # Errors
    ///
    /// [`SimulationError::Terminated`] after [`finish()`](Self::finish);
    /// otherwise the first error of a step, which is abandoned and not
    /// counted.
    pub fn simulate(&mut self, steps: u64) -> Result<(), SimulationError> {
        self.initialize()?;
        self.state = SchedulerState::Running;
        debug!(steps, from = self.total_steps, "simulating");
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Run steps until `exit` returns `true`. `exit` is checked before
    /// every step, so a condition that already holds runs none.
    pub fn simulate_until<F>(&mut self, mut exit: F) -> Result<(), SimulationError>
    where
        F: FnMut(&Self) -> bool,
    {
        self.initialize()?;
        self.state = SchedulerState::Running;
        while !exit(self) {
            self.step()?;
        }
        Ok(())
    }

    /// End the simulation. Further `simulate` calls fail with
    /// [`SimulationError::Terminated`]; agents and the grid stay readable.
    pub fn finish(&mut self) {
        if self.state == SchedulerState::Terminated {
            return;
        }
        info!(
            steps = self.total_steps,
            simulated_time = self.simulated_time,
            agents = self.world.rm.num_agents(),
            "simulation finished"
        );
        self.state = SchedulerState::Terminated;
    }

    fn step(&mut self) -> Result<(), SimulationError> {
        self.execute()?;
        self.total_steps += 1;
        self.simulated_time += self.world.param.simulation_time_step;
        Ok(())
    }

    fn execute(&mut self) -> Result<(), SimulationError> {
        let step = StepId(self.total_steps);
        let span = debug_span!("step", step = step.0);
        let _entered = span.enter();
        let started = Instant::now();

        self.apply_pending();
        self.world.committed = CommitSummary::default();
        let mut metrics = StepMetrics::default();

        self.run_standalone(OpStage::Pre, step, &mut metrics)?;
        self.run_agent_ops(step, &mut metrics)?;
        self.run_standalone(OpStage::Main, step, &mut metrics)?;
        self.run_standalone(OpStage::Post, step, &mut metrics)?;

        metrics.total_us = elapsed_us(started);
        metrics.num_agents = self.world.rm.num_agents();
        metrics.added = self.world.committed.added;
        metrics.removed = self.world.committed.removed;
        self.last_metrics = metrics;
        Ok(())
    }

    fn run_standalone(
        &mut self,
        stage: OpStage,
        step: StepId,
        metrics: &mut StepMetrics,
    ) -> Result<(), SimulationError> {
        let time = self.simulated_time;
        for (name, entry) in self.ops.iter_mut() {
            if entry.spec.stage != stage || !entry.spec.is_due(step.0) {
                continue;
            }
            let Operation::Standalone(op) = &mut entry.op else {
                continue;
            };
            let started = Instant::now();
            let mut ctx = self.world.context(step, time);
            op.run(&mut ctx).map_err(|e| SimulationError::OpFailed {
                name: name.clone(),
                source: Box::new(e),
            })?;
            metrics.op_us.push((name.clone(), elapsed_us(started)));
        }
        Ok(())
    }

    fn run_agent_ops(&mut self, step: StepId, metrics: &mut StepMetrics) -> Result<(), SimulationError> {
        let time = self.simulated_time;
        let mut due: Vec<_> = self
            .ops
            .iter_mut()
            .filter(|(_, e)| e.spec.is_due(step.0))
            .filter_map(|(name, e)| match &mut e.op {
                Operation::Agent(op) => Some((name.as_str(), &mut **op)),
                Operation::Standalone(_) => None,
            })
            .collect();
        if due.is_empty() {
            return Ok(());
        }
        let started = Instant::now();

        for (_, op) in &mut due {
            let ctx = self.world.context(step, time);
            op.set_up(&ctx);
        }
        match self.world.param.execution_order {
            ExecutionOrder::ForEachAgentForEachOp => {
                let ops: Vec<&dyn AgentOperation<A>> = due.iter().map(|(_, op)| &**op).collect();
                self.world.agent_pass(&ops, step)?;
            }
            ExecutionOrder::ForEachOpForEachAgent => {
                for (name, op) in &due {
                    let op_started = Instant::now();
                    self.world.agent_pass(&[&**op], step)?;
                    metrics.op_us.push((name.to_string(), elapsed_us(op_started)));
                }
            }
        }
        for (_, op) in &mut due {
            let ctx = self.world.context(step, time);
            op.tear_down(&ctx);
        }

        metrics.agent_phase_us = elapsed_us(started);
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────

    /// Lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Completed steps.
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Simulated time: completed steps times the time step.
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    /// Metrics of the most recent successful step.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.last_metrics
    }

    /// Simulation parameters.
    pub fn param(&self) -> &Param {
        &self.world.param
    }

    /// Agent storage.
    pub fn resource_manager(&self) -> &ResourceManager<A> {
        &self.world.rm
    }

    /// Mutable agent storage. Structural changes made here between steps
    /// are picked up by the next grid rebuild.
    pub fn resource_manager_mut(&mut self) -> &mut ResourceManager<A> {
        &mut self.world.rm
    }

    /// The grid as of the last rebuild.
    pub fn grid(&self) -> &UniformGrid {
        &self.world.grid
    }

    /// The worker pool.
    pub fn pool(&self) -> &NumaPool {
        &self.world.pool
    }

    /// Registered diffusion grids.
    pub fn diffusion_grids(&self) -> &[Box<dyn DiffusionGrid>] {
        &self.world.diffusion_grids
    }
}

impl<A: Agent> std::fmt::Debug for Scheduler<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("total_steps", &self.total_steps)
            .field("simulated_time", &self.simulated_time)
            .field("agents", &self.world.rm.num_agents())
            .field("ops", &self.scheduled_op_names())
            .finish()
    }
}

fn elapsed_us(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}
