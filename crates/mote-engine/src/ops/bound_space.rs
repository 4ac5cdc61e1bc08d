use mote_core::Agent;

use crate::context::AgentContext;
use crate::operation::AgentOperation;

/// Keeps agents inside the domain according to
/// [`Param::bound_space`](crate::Param::bound_space).
#[derive(Clone, Copy, Debug, Default)]
pub struct BoundSpaceOp;

impl<A: Agent> AgentOperation<A> for BoundSpaceOp {
    fn name(&self) -> &str {
        super::BOUND_SPACE
    }

    fn run(&self, agent: &mut A, ctx: &AgentContext<'_, A>) {
        let p = ctx.param();
        if !p.bound_space.is_bounded() {
            return;
        }
        let pos = agent.position();
        let bounded = p.bound_space.apply(pos, p.min_bound, p.max_bound);
        if bounded != pos {
            agent.set_position(bounded);
        }
    }
}
