//! Reusable operation fixtures for scheduler tests.
//!
//! - [`CountingOp`]: agent operation counting runs and hooks.
//! - [`DriftOp`]: agent operation moving every agent by a fixed offset.
//! - [`NeighborSumOp`]: agent operation recording what it reads.
//! - [`RecordingOp`]: standalone operation logging `(name, step)`.
//! - [`FailingOp`]: standalone operation failing at a given step.
//! - [`DivideOp`] / [`RemoveWhereOp`]: stage births and removals.
//! - [`MockDiffusionGrid`]: diffusion grid recording the calls it gets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mote_core::math::add;
use mote_core::{Agent, Real3};
use mote_engine::{AgentContext, AgentOperation, DiffusionGrid, SimContext, SimulationError, StandaloneOperation};

/// Counts agent visits and phase hooks.
#[derive(Clone, Default)]
pub struct OpCounters {
    pub runs: Arc<AtomicUsize>,
    pub set_ups: Arc<AtomicUsize>,
    pub tear_downs: Arc<AtomicUsize>,
}

impl OpCounters {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn set_ups(&self) -> usize {
        self.set_ups.load(Ordering::SeqCst)
    }

    pub fn tear_downs(&self) -> usize {
        self.tear_downs.load(Ordering::SeqCst)
    }
}

/// Agent operation that only counts.
pub struct CountingOp {
    pub name: String,
    pub counters: OpCounters,
}

impl CountingOp {
    /// The operation and a handle to its counters.
    pub fn new(name: impl Into<String>) -> (Self, OpCounters) {
        let counters = OpCounters::default();
        (
            Self {
                name: name.into(),
                counters: counters.clone(),
            },
            counters,
        )
    }
}

impl<A: Agent> AgentOperation<A> for CountingOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_up(&mut self, _ctx: &SimContext<'_, A>) {
        self.counters.set_ups.fetch_add(1, Ordering::SeqCst);
    }

    fn run(&self, _agent: &mut A, _ctx: &AgentContext<'_, A>) {
        self.counters.runs.fetch_add(1, Ordering::SeqCst);
    }

    fn tear_down(&mut self, _ctx: &SimContext<'_, A>) {
        self.counters.tear_downs.fetch_add(1, Ordering::SeqCst);
    }
}

/// Moves every agent by `offset`.
pub struct DriftOp {
    pub name: String,
    pub offset: Real3,
}

impl DriftOp {
    pub fn new(name: impl Into<String>, offset: Real3) -> Self {
        Self {
            name: name.into(),
            offset,
        }
    }
}

impl<A: Agent> AgentOperation<A> for DriftOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, agent: &mut A, _ctx: &AgentContext<'_, A>) {
        agent.set_position(add(agent.position(), self.offset));
    }
}

/// Records, per visited agent, the summed x coordinate of its neighbors
/// within `squared_radius` as read from the snapshot.
pub struct NeighborSumOp {
    pub name: String,
    pub squared_radius: f64,
    pub sums: Arc<Mutex<Vec<f64>>>,
}

impl NeighborSumOp {
    pub fn new(name: impl Into<String>, squared_radius: f64) -> (Self, Arc<Mutex<Vec<f64>>>) {
        let sums = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name: name.into(),
                squared_radius,
                sums: Arc::clone(&sums),
            },
            sums,
        )
    }
}

impl<A: Agent> AgentOperation<A> for NeighborSumOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, agent: &mut A, ctx: &AgentContext<'_, A>) {
        let mut sum = 0.0;
        ctx.for_each_neighbor(agent, self.squared_radius, |n, _, _| sum += n.position()[0]);
        self.sums.lock().unwrap().push(sum);
    }
}

/// Appends `(name, step)` to a shared log on every run.
pub struct RecordingOp {
    pub name: String,
    pub log: Arc<Mutex<Vec<(String, u64)>>>,
}

impl RecordingOp {
    pub fn new(name: impl Into<String>, log: &Arc<Mutex<Vec<(String, u64)>>>) -> Self {
        Self {
            name: name.into(),
            log: Arc::clone(log),
        }
    }
}

impl<A: Agent> StandaloneOperation<A> for RecordingOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut SimContext<'_, A>) -> Result<(), SimulationError> {
        self.log.lock().unwrap().push((self.name.clone(), ctx.step().0));
        Ok(())
    }
}

/// Fails when run at step `fail_at`.
pub struct FailingOp {
    pub name: String,
    pub fail_at: u64,
}

impl FailingOp {
    pub fn new(name: impl Into<String>, fail_at: u64) -> Self {
        Self {
            name: name.into(),
            fail_at,
        }
    }
}

impl<A: Agent> StandaloneOperation<A> for FailingOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut SimContext<'_, A>) -> Result<(), SimulationError> {
        if ctx.step().0 == self.fail_at {
            return Err(SimulationError::custom(format!(
                "failing at step {}",
                self.fail_at
            )));
        }
        Ok(())
    }
}

/// Every agent stages a copy of itself displaced by `offset`.
pub struct DivideOp {
    pub name: String,
    pub offset: Real3,
}

impl DivideOp {
    pub fn new(name: impl Into<String>, offset: Real3) -> Self {
        Self {
            name: name.into(),
            offset,
        }
    }
}

impl<A: Agent> AgentOperation<A> for DivideOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, agent: &mut A, ctx: &AgentContext<'_, A>) {
        let mut daughter = agent.clone();
        daughter.set_position(add(agent.position(), self.offset));
        ctx.new_agent(daughter);
    }
}

/// Stages the removal of every agent matching `predicate`.
pub struct RemoveWhereOp<A> {
    pub name: String,
    pub predicate: fn(&A) -> bool,
}

impl<A> RemoveWhereOp<A> {
    pub fn new(name: impl Into<String>, predicate: fn(&A) -> bool) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<A: Agent> AgentOperation<A> for RemoveWhereOp<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, agent: &mut A, ctx: &AgentContext<'_, A>) {
        if (self.predicate)(agent) {
            ctx.remove_agent(agent.uid());
        }
    }
}

/// Calls received by a [`MockDiffusionGrid`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiffusionLog {
    pub initialized: Option<[i32; 6]>,
    pub updates: Vec<[i32; 2]>,
    pub steps: usize,
    pub elapsed: f64,
}

/// Diffusion grid that only records what it is asked to do.
pub struct MockDiffusionGrid {
    pub substance: String,
    pub log: Arc<Mutex<DiffusionLog>>,
}

impl MockDiffusionGrid {
    pub fn new(substance: impl Into<String>) -> (Self, Arc<Mutex<DiffusionLog>>) {
        let log = Arc::new(Mutex::new(DiffusionLog::default()));
        (
            Self {
                substance: substance.into(),
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl DiffusionGrid for MockDiffusionGrid {
    fn substance(&self) -> &str {
        &self.substance
    }

    fn initialize(&mut self, dimensions: [i32; 6]) {
        self.log.lock().unwrap().initialized = Some(dimensions);
    }

    fn update(&mut self, thresholds: [i32; 2]) {
        self.log.lock().unwrap().updates.push(thresholds);
    }

    fn diffuse(&mut self, dt: f64) -> Result<(), SimulationError> {
        let mut log = self.log.lock().unwrap();
        log.steps += 1;
        log.elapsed += dt;
        Ok(())
    }
}
