//! The [`Agent`] capability trait and the reference spherical [`Cell`].

use crate::id::AgentUid;
use crate::math::Real3;

/// Capabilities the engine needs from a simulated agent.
///
/// Any type implementing this trait can be stored by the resource manager,
/// indexed by the spatial grid and driven by the scheduler. Agents are
/// cloned when the engine snapshots state for neighbor reads and when a
/// NUMA rebalance copies them into fresh per-node storage.
pub trait Agent: Clone + Send + Sync + 'static {
    /// Permanent identity, assigned by the resource manager.
    fn uid(&self) -> AgentUid;

    /// Set the identity. Called by the resource manager only.
    fn set_uid(&mut self, uid: AgentUid);

    /// Center position.
    fn position(&self) -> Real3;

    /// Move the agent.
    fn set_position(&mut self, position: Real3);

    /// Diameter of the agent's interaction sphere.
    fn diameter(&self) -> f64;

    /// Flat index of the grid box the agent was assigned to at the last
    /// grid rebuild.
    fn box_idx(&self) -> u32;

    /// Record the agent's grid box. Called by the grid only.
    fn set_box_idx(&mut self, idx: u32);

    /// Force the agent applies to itself, added to the mechanical
    /// interaction force. Zero unless overridden.
    fn tractor_force(&self) -> Real3 {
        [0.0; 3]
    }

    /// Force magnitude the agent resists before it moves.
    fn adherence(&self) -> f64 {
        0.0
    }
}

/// A spherical cell: the reference [`Agent`] implementation.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    uid: AgentUid,
    position: Real3,
    diameter: f64,
    box_idx: u32,
    tractor_force: Real3,
    adherence: f64,
}

impl Cell {
    /// Default cell diameter.
    pub const DEFAULT_DIAMETER: f64 = 10.0;

    /// A cell at `position` with the default diameter.
    pub fn new(position: Real3) -> Self {
        Self::with_diameter(position, Self::DEFAULT_DIAMETER)
    }

    /// A cell at `position` with the given diameter.
    pub fn with_diameter(position: Real3, diameter: f64) -> Self {
        Self {
            uid: AgentUid::default_unassigned(),
            position,
            diameter,
            box_idx: 0,
            tractor_force: [0.0; 3],
            adherence: 0.0,
        }
    }

    /// Change the diameter.
    pub fn set_diameter(&mut self, diameter: f64) {
        self.diameter = diameter;
    }

    /// Set the self-propulsion force.
    pub fn set_tractor_force(&mut self, force: Real3) {
        self.tractor_force = force;
    }

    /// Set the force threshold below which the cell stays put.
    pub fn set_adherence(&mut self, adherence: f64) {
        self.adherence = adherence;
    }
}

impl Agent for Cell {
    fn uid(&self) -> AgentUid {
        self.uid
    }

    fn set_uid(&mut self, uid: AgentUid) {
        self.uid = uid;
    }

    fn position(&self) -> Real3 {
        self.position
    }

    fn set_position(&mut self, position: Real3) {
        self.position = position;
    }

    fn diameter(&self) -> f64 {
        self.diameter
    }

    fn box_idx(&self) -> u32 {
        self.box_idx
    }

    fn set_box_idx(&mut self, idx: u32) {
        self.box_idx = idx;
    }

    fn tractor_force(&self) -> Real3 {
        self.tractor_force
    }

    fn adherence(&self) -> f64 {
        self.adherence
    }
}
