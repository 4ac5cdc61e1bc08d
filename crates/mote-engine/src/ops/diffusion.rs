//! Hook for grid-based substance diffusion.

use mote_core::Agent;

use crate::context::SimContext;
use crate::error::SimulationError;
use crate::operation::StandaloneOperation;

/// A substance field solved on its own grid.
///
/// The solver itself lives outside the engine. The engine sizes it from
/// the agent grid's dimensions and advances it once per step.
pub trait DiffusionGrid: Send {
    /// Name of the substance.
    fn substance(&self) -> &str;

    /// Allocate for the domain `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    /// Called once, when the simulation is initialized.
    fn initialize(&mut self, dimensions: [i32; 6]);

    /// Resize after the agent grid has grown to `thresholds`
    /// (`[min, max]` over all axes).
    fn update(&mut self, thresholds: [i32; 2]);

    /// Advance by `dt`.
    fn diffuse(&mut self, dt: f64) -> Result<(), SimulationError>;
}

/// Advances every registered [`DiffusionGrid`], resizing them first
/// when the agent grid has grown.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiffusionOp;

impl<A: Agent> StandaloneOperation<A> for DiffusionOp {
    fn name(&self) -> &str {
        super::DIFFUSION
    }

    fn run(&mut self, ctx: &mut SimContext<'_, A>) -> Result<(), SimulationError> {
        let grown = ctx.grid().has_grown();
        let thresholds = ctx.grid().dimension_thresholds();
        let dt = ctx.param().simulation_time_step;
        for grid in ctx.diffusion_grids_mut() {
            if grown {
                grid.update(thresholds);
            }
            grid.diffuse(dt)?;
        }
        Ok(())
    }
}
