//! Mote: an agent-based simulation engine with NUMA-aware agent storage
//! and uniform-grid neighbor search.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Mote sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use mote::prelude::*;
//!
//! let param = Param {
//!     num_threads: 2,
//!     bound_space: BoundSpaceMode::Closed,
//!     ..Param::default()
//! };
//! let mut sim: Scheduler<Cell> = Scheduler::new(param).unwrap();
//! for i in 0..8 {
//!     sim.add_agent(Cell::new([10.0 + 4.0 * i as f64, 50.0, 50.0]));
//! }
//! sim.simulate(20).unwrap();
//! assert_eq!(sim.resource_manager().num_agents(), 8);
//! assert!((sim.simulated_time() - 0.2).abs() < 1e-12);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `mote-core` | Ids, the `Agent` trait, `Cell`, vector math, scans |
//! | [`numa`] | `mote-numa` | Topology, `ThreadInfo`, `NumaPool`, `NumaVector` |
//! | [`resource`] | `mote-resource` | `ResourceManager`, iteration, staging, balancing |
//! | [`space`] | `mote-space` | `UniformGrid`, Z-order, bound space modes |
//! | [`engine`] | `mote-engine` | `Param`, operations, `Scheduler` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`mote-core`).
pub use mote_core as types;

/// Thread topology and per-node storage (`mote-numa`).
pub use mote_numa as numa;

/// Agent storage and parallel iteration (`mote-resource`).
pub use mote_resource as resource;

/// The uniform grid (`mote-space`).
///
/// [`space::UniformGrid`] partitions space into cubic boxes for neighbor
/// search and provides the Z-order used to rebalance agents.
pub use mote_space as space;

/// The operation pipeline (`mote-engine`).
pub use mote_engine as engine;

/// Common imports for typical Mote usage.
pub mod prelude {
    // Core
    pub use mote_core::{Agent, AgentHandle, AgentUid, Cell, Real3};

    // Storage
    pub use mote_resource::{IterationStrategy, ResourceManager};

    // Space
    pub use mote_space::{BoundSpaceMode, UniformGrid};

    // Engine
    pub use mote_engine::{
        AgentContext, AgentOperation, DiffusionGrid, ExecutionOrder, OpSpec, OpStage, Operation, Param,
        Scheduler, SimContext, SimulationError, StandaloneOperation, StepMetrics,
    };
}
