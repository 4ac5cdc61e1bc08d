//! Test utilities for Mote development.
//!
//! Agent populations with known geometry ([`cubic_lattice`],
//! [`line_of_cells`], [`random_cells`]) and reusable operation fixtures
//! for scheduler tests ([`fixtures`]).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use mote_core::{Agent, AgentUid, Cell};
use mote_resource::ResourceManager;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `n` cells on the x axis, one unit apart, diameter 1.
pub fn line_of_cells(n: usize) -> Vec<Cell> {
    (0..n)
        .map(|i| Cell::with_diameter([i as f64, 0.0, 0.0], 1.0))
        .collect()
}

/// `n^3` cells on a cubic lattice.
///
/// Cell `i * n * n + j * n + k` sits at `(k, j, i) * spacing`.
pub fn cubic_lattice(n: usize, spacing: f64, diameter: f64) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let p = [k as f64 * spacing, j as f64 * spacing, i as f64 * spacing];
                cells.push(Cell::with_diameter(p, diameter));
            }
        }
    }
    cells
}

/// `n` cells uniformly placed in `[0, extent)^3`, reproducible from `seed`.
pub fn random_cells(n: usize, extent: f64, diameter: f64, seed: u64) -> Vec<Cell> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut unit = move || (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64);
    (0..n)
        .map(|_| Cell::with_diameter([unit() * extent, unit() * extent, unit() * extent], diameter))
        .collect()
}

/// Add `agents` in order and return their uids, in the same order.
pub fn populate<A: Agent>(rm: &mut ResourceManager<A>, agents: Vec<A>) -> Vec<AgentUid> {
    agents.into_iter().map(|a| rm.add_agent(a)).collect()
}
