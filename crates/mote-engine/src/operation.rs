//! The operation traits and their scheduling metadata.
//!
//! Operations are the unit of work of a simulation step. An
//! [`AgentOperation`] runs once per agent inside a parallel phase; a
//! [`StandaloneOperation`] runs once per step on the calling thread with
//! exclusive access to the simulation.

use mote_core::Agent;

use crate::context::{AgentContext, SimContext};
use crate::error::SimulationError;

/// Work applied to every agent in a parallel phase.
///
/// # Contract
///
/// - `run()` writes only to `agent`. Neighbors and every other agent are
///   read from the context's snapshot, which holds the state at the start
///   of the phase.
/// - Births and removals go through [`AgentContext::new_agent`] and
///   [`AgentContext::remove_agent`]; they take effect at the next commit.
/// - `set_up()` and `tear_down()` run on the scheduling thread before and
///   after the phase, on steps where the operation is due.
///
/// # Examples
///
/// ```
/// use mote_core::{Agent, Cell};
/// use mote_engine::{AgentContext, AgentOperation};
///
/// struct Drift([f64; 3]);
///
/// impl AgentOperation<Cell> for Drift {
///     fn name(&self) -> &str { "drift" }
///
///     fn run(&self, agent: &mut Cell, _ctx: &AgentContext<'_, Cell>) {
///         let p = agent.position();
///         agent.set_position([p[0] + self.0[0], p[1] + self.0[1], p[2] + self.0[2]]);
///     }
/// }
///
/// assert_eq!(Drift([1.0, 0.0, 0.0]).name(), "drift");
/// ```
pub trait AgentOperation<A: Agent>: Send + Sync + 'static {
    /// Unique name, used for scheduling and timing.
    fn name(&self) -> &str;

    /// Prepare for a phase.
    fn set_up(&mut self, _ctx: &SimContext<'_, A>) {}

    /// Process one agent.
    fn run(&self, agent: &mut A, ctx: &AgentContext<'_, A>);

    /// Clean up after a phase.
    fn tear_down(&mut self, _ctx: &SimContext<'_, A>) {}
}

/// Work run once per step with exclusive access to the simulation.
pub trait StandaloneOperation<A: Agent>: Send + 'static {
    /// Unique name, used for scheduling and timing.
    fn name(&self) -> &str;

    /// Execute the operation. An error abandons the rest of the step.
    fn run(&mut self, ctx: &mut SimContext<'_, A>) -> Result<(), SimulationError>;
}

/// A boxed operation of either kind.
pub enum Operation<A: Agent> {
    /// Runs per agent.
    Agent(Box<dyn AgentOperation<A>>),
    /// Runs once per step.
    Standalone(Box<dyn StandaloneOperation<A>>),
}

impl<A: Agent> Operation<A> {
    /// Box an agent operation.
    pub fn agent(op: impl AgentOperation<A>) -> Self {
        Self::Agent(Box::new(op))
    }

    /// Box a standalone operation.
    pub fn standalone(op: impl StandaloneOperation<A>) -> Self {
        Self::Standalone(Box::new(op))
    }

    /// The operation's name.
    pub fn name(&self) -> &str {
        match self {
            Self::Agent(op) => op.name(),
            Self::Standalone(op) => op.name(),
        }
    }

    /// `true` for agent operations.
    pub fn is_agent(&self) -> bool {
        matches!(self, Self::Agent(_))
    }
}

/// Where in the step an operation runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OpStage {
    /// Before the agent phase.
    Pre,
    /// Agent operations, then standalone operations.
    #[default]
    Main,
    /// After the main stage.
    Post,
}

/// Scheduling metadata of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpSpec {
    /// Stage the operation runs in.
    pub stage: OpStage,
    /// Run on steps where `total_steps % frequency == 0`. Zero disables
    /// the operation without unscheduling it.
    pub frequency: u64,
    /// Protected operations cannot be unscheduled.
    pub protected: bool,
}

impl OpSpec {
    /// Main stage, every step.
    pub const fn main() -> Self {
        Self {
            stage: OpStage::Main,
            frequency: 1,
            protected: false,
        }
    }

    /// Pre stage, every step.
    pub const fn pre() -> Self {
        Self {
            stage: OpStage::Pre,
            ..Self::main()
        }
    }

    /// Post stage, every step.
    pub const fn post() -> Self {
        Self {
            stage: OpStage::Post,
            ..Self::main()
        }
    }

    /// Run every `frequency` steps.
    pub const fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Mark as protected.
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Whether the operation runs at step `total_steps`.
    pub fn is_due(&self, total_steps: u64) -> bool {
        self.frequency != 0 && total_steps % self.frequency == 0
    }
}

impl Default for OpSpec {
    fn default() -> Self {
        Self::main()
    }
}
