//! Pipeline bookkeeping: commits, grid rebuilds, rebalancing.

use mote_core::Agent;

use crate::context::SimContext;
use crate::error::SimulationError;
use crate::operation::StandaloneOperation;

/// Commits changes staged before the first step.
#[derive(Clone, Copy, Debug, Default)]
pub struct SetUpIterationOp;

impl<A: Agent> StandaloneOperation<A> for SetUpIterationOp {
    fn name(&self) -> &str {
        super::SET_UP_ITERATION
    }

    fn run(&mut self, ctx: &mut SimContext<'_, A>) -> Result<(), SimulationError> {
        ctx.commit()?;
        Ok(())
    }
}

/// Rebuilds the grid from the current positions.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateEnvironmentOp;

impl<A: Agent> StandaloneOperation<A> for UpdateEnvironmentOp {
    fn name(&self) -> &str {
        super::UPDATE_ENVIRONMENT
    }

    fn run(&mut self, ctx: &mut SimContext<'_, A>) -> Result<(), SimulationError> {
        ctx.update_environment()
    }
}

/// Reorders agents in Z-order and spreads them over the NUMA nodes.
///
/// Runs before the step's commit: agents staged this step are not in the
/// grid yet and join the order on the next rebalance.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadBalancingOp;

impl<A: Agent> StandaloneOperation<A> for LoadBalancingOp {
    fn name(&self) -> &str {
        super::LOAD_BALANCING
    }

    fn run(&mut self, ctx: &mut SimContext<'_, A>) -> Result<(), SimulationError> {
        ctx.balance()
    }
}

/// Commits births and removals staged during the step.
#[derive(Clone, Copy, Debug, Default)]
pub struct TearDownIterationOp;

impl<A: Agent> StandaloneOperation<A> for TearDownIterationOp {
    fn name(&self) -> &str {
        super::TEAR_DOWN_ITERATION
    }

    fn run(&mut self, ctx: &mut SimContext<'_, A>) -> Result<(), SimulationError> {
        ctx.commit()?;
        Ok(())
    }
}
