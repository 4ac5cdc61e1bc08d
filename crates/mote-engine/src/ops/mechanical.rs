//! Sphere-sphere repulsion and the resulting displacement.

use mote_core::math::{add, norm, scale, sub};
use mote_core::{Agent, Real3};
use rand_chacha::rand_core::RngCore;
use rand_chacha::ChaCha8Rng;

use crate::context::{uniform, AgentContext, SimContext};
use crate::operation::AgentOperation;

/// Added to each sphere's radius when testing for contact.
const INTERACTION_RADIUS_BONUS: f64 = 1.5;
/// Repulsion coefficient.
const REPULSION: f64 = 2.0;
/// Attraction coefficient.
const ATTRACTION: f64 = 1.0;
/// Centers closer than this are treated as coincident.
const COINCIDENT: f64 = 1e-8;
/// Magnitude bound of the random force separating coincident centers.
const COINCIDENT_FORCE: f64 = 3.0;

/// Force exerted on sphere 1 by sphere 2.
///
/// With `r_i = d_i / 2 + 1.5`, overlap `δ = r1 + r2 - |c1 - c2|` and
/// `r = r1 r2 / (r1 + r2)`, the magnitude is `2δ - sqrt(r δ)`, directed
/// from `c2` to `c1`. Non-overlapping spheres exert no force; coincident
/// centers get a random force in `[-3, 3)` per axis.
pub fn sphere_sphere_force(
    c1: Real3,
    d1: f64,
    c2: Real3,
    d2: f64,
    rng: &mut impl RngCore,
) -> Real3 {
    let r1 = 0.5 * d1 + INTERACTION_RADIUS_BONUS;
    let r2 = 0.5 * d2 + INTERACTION_RADIUS_BONUS;
    let between = sub(c1, c2);
    let distance = norm(between);
    let overlap = r1 + r2 - distance;
    if overlap < 0.0 {
        return [0.0; 3];
    }
    if distance < COINCIDENT {
        return std::array::from_fn(|_| uniform(rng, -COINCIDENT_FORCE, COINCIDENT_FORCE));
    }
    let r = r1 * r2 / (r1 + r2);
    let magnitude = REPULSION * overlap - ATTRACTION * (r * overlap).sqrt();
    scale(between, magnitude / distance)
}

/// Moves every agent by the sum of its tractor force and the contact
/// forces of its neighbors, scaled by the time step.
///
/// Contact forces move the agent only when their norm exceeds the agent's
/// adherence, and the move is clamped to
/// [`Param::simulation_max_displacement`](crate::Param::simulation_max_displacement).
/// Neighbors are searched within the largest agent diameter of the last
/// grid build.
#[derive(Clone, Copy, Debug, Default)]
pub struct MechanicalForcesOp {
    squared_radius: f64,
}

impl MechanicalForcesOp {
    /// Squared search radius used in the current phase.
    pub fn squared_radius(&self) -> f64 {
        self.squared_radius
    }
}

impl<A: Agent> AgentOperation<A> for MechanicalForcesOp {
    fn name(&self) -> &str {
        super::MECHANICAL_FORCES
    }

    fn set_up(&mut self, ctx: &SimContext<'_, A>) {
        let largest = ctx.grid().largest_object_size();
        self.squared_radius = largest * largest;
    }

    fn run(&self, agent: &mut A, ctx: &AgentContext<'_, A>) {
        let dt = ctx.param().simulation_time_step;
        let max_displacement = ctx.param().simulation_max_displacement;
        let position = agent.position();
        let diameter = agent.diameter();
        let uid = agent.uid();

        let mut rng: Option<ChaCha8Rng> = None;
        let mut force = [0.0; 3];
        ctx.for_each_neighbor(agent, self.squared_radius, |neighbor, _, _| {
            let rng = rng.get_or_insert_with(|| ctx.rng_for(uid));
            let f = sphere_sphere_force(position, diameter, neighbor.position(), neighbor.diameter(), rng);
            force = add(force, f);
        });

        let mut movement = scale(agent.tractor_force(), dt);
        let force_norm = norm(force);
        if force_norm > agent.adherence() {
            movement = add(movement, scale(force, dt));
            let length = norm(movement);
            if force_norm * dt > max_displacement && length > 0.0 {
                movement = scale(movement, max_displacement / length);
            }
        }
        if movement != [0.0; 3] {
            agent.set_position(add(position, movement));
        }
    }
}
