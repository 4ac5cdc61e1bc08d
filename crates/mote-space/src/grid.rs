//! The uniform grid: box geometry, box assembly and neighbor search.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use mote_core::math::{is_finite, squared_distance};
use mote_core::{exclusive_prefix_sum, Agent, AgentHandle, AgentUid, NumaNodeId, Real3};
use mote_numa::{NumaPool, NumaVector};
use mote_resource::{IterationStrategy, ResourceManager};
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::bound::BoundSpaceMode;
use crate::error::GridError;

// ── Configuration ───────────────────────────────────────────────

/// Grid settings, usually derived from the simulation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridConfig {
    /// Boundary behavior of the domain.
    pub bound_space: BoundSpaceMode,
    /// Lower domain bound, used when `bound_space` is not `Open`.
    pub min_bound: f64,
    /// Upper domain bound, used when `bound_space` is not `Open`.
    pub max_bound: f64,
    /// Fixed box edge length. `None` derives it from the largest agent.
    pub box_length: Option<u32>,
    /// Traversal used to assign agents to boxes.
    pub iteration: IterationStrategy,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bound_space: BoundSpaceMode::Open,
            min_bound: 0.0,
            max_bound: 100.0,
            box_length: None,
            iteration: IterationStrategy::default(),
        }
    }
}

// ── Geometry ────────────────────────────────────────────────────

/// Integer box geometry of one grid build. Copied into parallel closures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Geometry {
    dims: [i32; 6],
    box_length: u32,
    num_boxes_axis: [u32; 3],
}

impl Geometry {
    fn num_boxes_xy(&self) -> usize {
        self.num_boxes_axis[0] as usize * self.num_boxes_axis[1] as usize
    }

    fn total_boxes(&self) -> usize {
        self.num_boxes_xy() * self.num_boxes_axis[2] as usize
    }

    /// Box coordinates of `position`, clamped into the grid.
    fn coordinates_of(&self, position: Real3) -> [u32; 3] {
        let bl = f64::from(self.box_length.max(1));
        std::array::from_fn(|axis| {
            let rel = (position[axis].floor() - f64::from(self.dims[2 * axis])) / bl;
            let last = self.num_boxes_axis[axis].saturating_sub(1);
            // `as` saturates; negative and NaN land on 0
            (rel as u32).min(last)
        })
    }

    fn flatten(&self, c: [u32; 3]) -> usize {
        c[2] as usize * self.num_boxes_xy() + c[1] as usize * self.num_boxes_axis[0] as usize + c[0] as usize
    }

    fn box_index(&self, position: Real3) -> usize {
        self.flatten(self.coordinates_of(position))
    }
}

// ── Extent ──────────────────────────────────────────────────────

/// Bounding box of the population plus its largest diameter.
#[derive(Clone, Copy, Debug)]
struct Extent {
    min: Real3,
    max: Real3,
    largest: f64,
}

impl Extent {
    fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
            largest: 0.0,
        }
    }

    fn of<A: Agent>(agent: &A) -> Result<Self, GridError> {
        let p = agent.position();
        if !is_finite(p) {
            return Err(GridError::NonFinitePosition { uid: agent.uid() });
        }
        Ok(Self {
            min: p,
            max: p,
            largest: agent.diameter(),
        })
    }

    fn merge(self, other: Self) -> Self {
        Self {
            min: std::array::from_fn(|i| self.min[i].min(other.min[i])),
            max: std::array::from_fn(|i| self.max[i].max(other.max[i])),
            largest: self.largest.max(other.largest),
        }
    }
}

/// Padded `[lo, hi]` bounds of one axis and its box count, or `None` if
/// they do not fit in `i64`.
fn padded_axis(lo: i64, hi: i64, bl: i64) -> Option<([i64; 2], u64)> {
    let r = hi.checked_sub(lo)? % bl;
    // Round up to a whole number of boxes; an agent exactly on the upper
    // edge still needs a box of its own.
    let hi = hi.checked_add(if r != 0 { bl - r } else { bl })?;
    let lo = lo.checked_sub(bl)?;
    let hi = hi.checked_add(bl)?;
    let span = u64::try_from(hi.checked_sub(lo)?).ok()?;
    Some(([lo, hi], span / bl.unsigned_abs()))
}

fn pack(h: AgentHandle) -> u64 {
    (u64::from(h.numa_node().0) << 32) | u64::from(h.element_idx())
}

fn unpack(v: u64) -> AgentHandle {
    AgentHandle::new(NumaNodeId((v >> 32) as u16), v as u32)
}

// ── UniformGrid ─────────────────────────────────────────────────

/// Regular 3D box grid over the agent population.
///
/// The grid is rebuilt from scratch by [`update`](Self::update). Between
/// updates it answers neighbor queries against the positions agents had
/// at build time; box membership is never patched incrementally.
///
/// Layout after a build: the domain spans `dimensions()` (inclusive
/// integer bounds per axis, padded by one box on every side so that the
/// Moore neighborhood of any populated box is in range), boxes are
/// numbered `z * nx * ny + y * nx + x`, and the agents of box `b` are the
/// contiguous range `box_start[b]..box_start[b + 1]` of a flat handle
/// array.
#[derive(Clone, Debug)]
pub struct UniformGrid {
    config: GridConfig,
    geometry: Geometry,
    threshold_dimensions: [i32; 2],
    largest_object_size: f64,
    box_start: Vec<usize>,
    successors: Vec<AgentHandle>,
    has_grown: bool,
    initialized: bool,
}

impl UniformGrid {
    /// An empty, uninitialized grid.
    pub fn new(config: GridConfig) -> Self {
        Self {
            config,
            geometry: Geometry::default(),
            threshold_dimensions: [i32::MAX, i32::MIN],
            largest_object_size: 0.0,
            box_start: vec![0],
            successors: Vec::new(),
            has_grown: false,
            initialized: false,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Fix the box edge length for subsequent builds, or `None` to derive
    /// it from the largest agent again.
    pub fn set_box_length(&mut self, box_length: Option<u32>) {
        self.config.box_length = box_length;
    }

    /// Rebuild box membership from the current agent positions.
    ///
    /// Stores each agent's box in [`Agent::set_box_idx`]. With no agents,
    /// a bounded grid that was never built takes the domain bounds as its
    /// dimensions; an unbounded one fails with
    /// [`GridError::EmptyUnbounded`].
    pub fn update<A: Agent>(
        &mut self,
        rm: &mut ResourceManager<A>,
        pool: &NumaPool,
    ) -> Result<(), GridError> {
        if rm.is_empty() {
            return self.update_empty();
        }

        let extent = pool.install(|| {
            rm.shards()
                .par_iter()
                .flat_map_iter(|shard| shard.iter())
                .map(Extent::of)
                .try_reduce(Extent::empty, |a, b| Ok(a.merge(b)))
        })?;
        self.largest_object_size = extent.largest;
        let geometry = self.geometry_for(&extent)?;
        self.geometry = geometry;
        self.has_grown = false;
        self.check_grid_growth();

        let total = geometry.total_boxes();
        let counts: Vec<AtomicUsize> = (0..total).map(|_| AtomicUsize::new(0)).collect();
        rm.apply_parallel(pool, self.config.iteration, |agent, _| {
            let idx = geometry.box_index(agent.position());
            // total_boxes() <= u32::MAX, checked in geometry_for
            agent.set_box_idx(idx as u32);
            counts[idx].fetch_add(1, Ordering::Relaxed);
        })?;

        let mut box_start: Vec<usize> = counts.into_iter().map(AtomicUsize::into_inner).collect();
        box_start.push(0);
        exclusive_prefix_sum(&mut box_start);

        let cursor: Vec<AtomicUsize> = box_start[..total].iter().map(|&s| AtomicUsize::new(s)).collect();
        let slots: Vec<AtomicU64> = (0..rm.num_agents()).map(|_| AtomicU64::new(0)).collect();
        rm.for_each_parallel(pool, self.config.iteration, |agent, handle| {
            let at = cursor[agent.box_idx() as usize].fetch_add(1, Ordering::Relaxed);
            slots[at].store(pack(handle), Ordering::Relaxed);
        })?;
        let mut successors: Vec<AgentHandle> =
            slots.into_iter().map(|s| unpack(s.into_inner())).collect();
        // Scatter order depends on thread timing; sort each box by handle.
        for w in box_start.windows(2) {
            successors[w[0]..w[1]].sort_unstable();
        }
        self.box_start = box_start;
        self.successors = successors;

        if self.config.bound_space.is_bounded() {
            self.threshold_dimensions = self.bound_thresholds();
        }
        self.initialized = true;
        debug!(
            agents = rm.num_agents(),
            box_length = geometry.box_length,
            boxes = ?geometry.num_boxes_axis,
            has_grown = self.has_grown,
            "grid rebuilt"
        );
        Ok(())
    }

    fn update_empty(&mut self) -> Result<(), GridError> {
        if self.initialized {
            self.has_grown = false;
            self.box_start.iter_mut().for_each(|s| *s = 0);
            self.successors.clear();
            return Ok(());
        }
        if !self.config.bound_space.is_bounded() {
            return Err(GridError::EmptyUnbounded);
        }
        let [lo, hi] = self.bound_thresholds();
        self.geometry.dims = [lo, hi, lo, hi, lo, hi];
        self.threshold_dimensions = [lo, hi];
        self.has_grown = true;
        trace!(lo, hi, "empty bounded grid sized from bounds");
        Ok(())
    }

    fn bound_thresholds(&self) -> [i32; 2] {
        [self.config.min_bound as i32, self.config.max_bound as i32]
    }

    fn geometry_for(&self, extent: &Extent) -> Result<Geometry, GridError> {
        let box_length = match self.config.box_length {
            Some(l) => l,
            None if extent.largest > 0.0 && extent.largest.is_finite() => {
                extent.largest.ceil() as u32
            }
            None => {
                return Err(GridError::InvalidBoxLength {
                    length: extent.largest,
                })
            }
        };
        if box_length == 0 {
            return Err(GridError::InvalidBoxLength { length: 0.0 });
        }

        let bl = i64::from(box_length);
        let mut bounds = [[0i64; 2]; 3];
        let mut boxes = [0u64; 3];
        for axis in 0..3 {
            // `as` saturates; huge positions overflow below and are rejected
            let lo = extent.min[axis].floor() as i64;
            let hi = extent.max[axis].ceil() as i64;
            match padded_axis(lo, hi, bl) {
                Some((axis_bounds, n)) => {
                    bounds[axis] = axis_bounds;
                    boxes[axis] = n;
                }
                None => {
                    boxes[axis] = u64::MAX;
                    return Err(GridError::TooManyBoxes {
                        boxes_per_axis: boxes,
                    });
                }
            }
        }

        let too_many = || GridError::TooManyBoxes {
            boxes_per_axis: boxes,
        };
        let total = boxes.iter().try_fold(1u64, |acc, &n| acc.checked_mul(n));
        if total.is_none_or(|t| t > u64::from(u32::MAX)) {
            return Err(too_many());
        }
        let mut dims = [0i32; 6];
        for axis in 0..3 {
            for side in 0..2 {
                dims[2 * axis + side] = i32::try_from(bounds[axis][side]).map_err(|_| too_many())?;
            }
        }
        Ok(Geometry {
            dims,
            box_length,
            num_boxes_axis: boxes.map(|n| n as u32),
        })
    }

    /// Widen the growth thresholds to the new dimensions; either side
    /// moving outwards marks the grid as grown.
    fn check_grid_growth(&mut self) {
        let dims = &self.geometry.dims;
        let min_gd = dims.iter().copied().min().unwrap_or(0);
        let max_gd = dims.iter().copied().max().unwrap_or(0);
        if min_gd < self.threshold_dimensions[0] {
            self.threshold_dimensions[0] = min_gd;
            self.has_grown = true;
        }
        if max_gd > self.threshold_dimensions[1] {
            self.threshold_dimensions[1] = max_gd;
            self.has_grown = true;
        }
    }

    // ── Queries ─────────────────────────────────────────────

    /// `true` once a build with at least one agent has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the last update widened the growth thresholds.
    pub fn has_grown(&self) -> bool {
        self.has_grown
    }

    /// `[xmin, xmax, ymin, ymax, zmin, zmax]`, including padding.
    pub fn dimensions(&self) -> [i32; 6] {
        self.geometry.dims
    }

    /// Smallest and largest dimension ever seen (or the domain bounds
    /// when the space is bounded).
    pub fn dimension_thresholds(&self) -> [i32; 2] {
        self.threshold_dimensions
    }

    /// Largest agent diameter at the last build.
    pub fn largest_object_size(&self) -> f64 {
        self.largest_object_size
    }

    /// Box edge length of the last build.
    pub fn box_length(&self) -> u32 {
        self.geometry.box_length
    }

    /// Boxes per axis.
    pub fn num_boxes_axis(&self) -> [u32; 3] {
        self.geometry.num_boxes_axis
    }

    /// Total number of boxes.
    pub fn num_boxes(&self) -> usize {
        self.geometry.total_boxes()
    }

    /// Flat index of the box containing `position`.
    ///
    /// Positions outside the grid map to the nearest edge box.
    pub fn get_box_index(&self, position: Real3) -> usize {
        self.geometry.box_index(position)
    }

    /// `[x, y, z]` coordinates of box `box_idx`.
    pub fn get_box_coordinates(&self, box_idx: usize) -> [u32; 3] {
        let nx = self.geometry.num_boxes_axis[0].max(1) as usize;
        let nxy = self.geometry.num_boxes_xy().max(1);
        [
            (box_idx % nx) as u32,
            ((box_idx % nxy) / nx) as u32,
            (box_idx / nxy) as u32,
        ]
    }

    /// Flat index of the box at coordinates `c`.
    pub fn get_box_index_of(&self, c: [u32; 3]) -> usize {
        self.geometry.flatten(c)
    }

    /// Handles of the agents assigned to box `box_idx` at the last build.
    pub fn box_agents(&self, box_idx: usize) -> &[AgentHandle] {
        match (self.box_start.get(box_idx), self.box_start.get(box_idx + 1)) {
            (Some(&s), Some(&e)) => &self.successors[s..e],
            _ => &[],
        }
    }

    /// Number of agents in box `box_idx`.
    pub fn box_len(&self, box_idx: usize) -> usize {
        self.box_agents(box_idx).len()
    }

    /// Number of agents indexed by the last build.
    pub fn num_agents(&self) -> usize {
        self.successors.len()
    }

    /// Indices of the (up to 27) boxes around and including box `c`.
    pub fn moore_boxes(&self, c: [u32; 3]) -> SmallVec<[usize; 27]> {
        let n = self.geometry.num_boxes_axis;
        let mut out = SmallVec::new();
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let x = i64::from(c[0]) + dx;
                    let y = i64::from(c[1]) + dy;
                    let z = i64::from(c[2]) + dz;
                    let inside = (0..i64::from(n[0])).contains(&x)
                        && (0..i64::from(n[1])).contains(&y)
                        && (0..i64::from(n[2])).contains(&z);
                    if inside {
                        out.push(self.geometry.flatten([x as u32, y as u32, z as u32]));
                    }
                }
            }
        }
        out
    }

    /// Call `f(neighbor, handle, squared_distance)` for every agent within
    /// `squared_radius` of `query`, excluding `query` itself.
    ///
    /// `shards` must be the storage the grid was built from (or a snapshot
    /// of it taken after the build). Only the 27 boxes around the query's
    /// box are examined, so `squared_radius` should not exceed the square
    /// of [`box_length`](Self::box_length).
    pub fn for_each_neighbor_within_radius<A, F>(
        &self,
        shards: &[NumaVector<A>],
        query: &A,
        squared_radius: f64,
        mut f: F,
    ) where
        A: Agent,
        F: FnMut(&A, AgentHandle, f64),
    {
        if !self.initialized {
            return;
        }
        let position = query.position();
        let uid = query.uid();
        for b in self.moore_boxes(self.geometry.coordinates_of(position)) {
            for &h in self.box_agents(b) {
                let Some(other) = resolve(shards, h) else {
                    continue;
                };
                if other.uid() == uid {
                    continue;
                }
                let d2 = squared_distance(position, other.position());
                if d2 <= squared_radius {
                    f(other, h, d2);
                }
            }
        }
    }

    /// Uids of all neighbors of `query` within `squared_radius`, sorted.
    pub fn neighbor_uids<A: Agent>(
        &self,
        shards: &[NumaVector<A>],
        query: &A,
        squared_radius: f64,
    ) -> Vec<AgentUid> {
        let mut out = Vec::new();
        self.for_each_neighbor_within_radius(shards, query, squared_radius, |a, _, _| {
            out.push(a.uid());
        });
        out.sort_unstable();
        out
    }
}

fn resolve<A>(shards: &[NumaVector<A>], h: AgentHandle) -> Option<&A> {
    shards
        .get(h.numa_node().index())
        .and_then(|s| s.get(h.element_idx() as usize))
}
