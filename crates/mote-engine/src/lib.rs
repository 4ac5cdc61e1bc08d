//! Operation pipeline and scheduler for the Mote simulation engine.
//!
//! A [`Scheduler`] owns the agents (through a
//! [`ResourceManager`](mote_resource::ResourceManager)), the
//! [`UniformGrid`](mote_space::UniformGrid) and a NUMA-aware worker pool,
//! and advances the simulation one step at a time by running its
//! registered operations:
//!
//! - [`AgentOperation`]s run once per agent in a parallel phase. They
//!   read neighbors from a snapshot and write only to the agent they are
//!   given.
//! - [`StandaloneOperation`]s run once per step with exclusive access to
//!   the simulation through a [`SimContext`].
//!
//! The default pipeline ([`ops`]) commits staged births and removals,
//! rebuilds the grid, keeps agents inside the domain, resolves
//! mechanical contacts, advances diffusion grids and rebalances agents
//! over NUMA nodes along the grid's Z-order.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod error;
pub mod metrics;
pub mod operation;
pub mod ops;
pub mod param;
pub mod scheduler;

pub use context::{agent_rng, uniform, AgentContext, SimContext};
pub use error::{ScheduleError, SimulationError};
pub use metrics::StepMetrics;
pub use operation::{AgentOperation, OpSpec, OpStage, Operation, StandaloneOperation};
pub use ops::DiffusionGrid;
pub use param::{ConfigError, ExecutionOrder, Param};
pub use scheduler::{Scheduler, SchedulerState};
