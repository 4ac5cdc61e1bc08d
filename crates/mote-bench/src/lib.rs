//! Benchmark profiles for the Mote simulation engine.
//!
//! - [`reference_profile`]: 10K cells in a 1000-unit cube, default
//!   pipeline, all available threads
//! - [`dense_profile`]: 100K cells in the same cube
//! - [`populated`]: a resource manager and pool filled with a profile's
//!   cells, for benchmarking a single subsystem

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use mote_core::Cell;
use mote_engine::{Param, Scheduler, SimulationError};
use mote_numa::{NumaError, NumaPool};
use mote_resource::ResourceManager;
use mote_test_utils::{populate, random_cells};

/// Side of the cube cells are placed in.
pub const EXTENT: f64 = 1000.0;
/// Diameter of every benchmark cell.
pub const DIAMETER: f64 = 10.0;

/// 10K cells with the default pipeline.
pub fn reference_profile(seed: u64) -> Result<Scheduler<Cell>, SimulationError> {
    profile(10_000, seed)
}

/// 100K cells with the default pipeline.
pub fn dense_profile(seed: u64) -> Result<Scheduler<Cell>, SimulationError> {
    profile(100_000, seed)
}

fn profile(cells: usize, seed: u64) -> Result<Scheduler<Cell>, SimulationError> {
    let param = Param {
        random_seed: seed,
        ..Param::default()
    };
    let mut sim = Scheduler::new(param)?;
    for cell in random_cells(cells, EXTENT, DIAMETER, seed) {
        sim.add_agent(cell);
    }
    sim.initialize()?;
    Ok(sim)
}

/// `cells` random cells in a resource manager for a single-node pool of
/// `threads` workers.
pub fn populated(
    cells: usize,
    threads: usize,
    seed: u64,
) -> Result<(NumaPool, ResourceManager<Cell>), NumaError> {
    let pool = NumaPool::single_node(threads)?;
    let mut rm = ResourceManager::for_pool(&pool);
    populate(&mut rm, random_cells(cells, EXTENT, DIAMETER, seed));
    Ok((pool, rm))
}
