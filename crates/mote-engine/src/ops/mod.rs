//! Built-in operations of the default pipeline.
//!
//! | name                  | stage | kind       | protected |
//! |-----------------------|-------|------------|-----------|
//! | `set up iteration`    | pre   | standalone | yes       |
//! | `update environment`  | pre   | standalone | yes       |
//! | `bound space`         | main  | agent      | no        |
//! | `mechanical forces`   | main  | agent      | no        |
//! | `diffusion`           | main  | standalone | no        |
//! | `load balancing`      | post  | standalone | no        |
//! | `tear down iteration` | post  | standalone | yes       |

mod bound_space;
mod builtin;
mod diffusion;
mod mechanical;

pub use bound_space::BoundSpaceOp;
pub use builtin::{LoadBalancingOp, SetUpIterationOp, TearDownIterationOp, UpdateEnvironmentOp};
pub use diffusion::{DiffusionGrid, DiffusionOp};
pub use mechanical::{sphere_sphere_force, MechanicalForcesOp};

/// Name of [`SetUpIterationOp`].
pub const SET_UP_ITERATION: &str = "set up iteration";
/// Name of [`UpdateEnvironmentOp`].
pub const UPDATE_ENVIRONMENT: &str = "update environment";
/// Name of [`BoundSpaceOp`].
pub const BOUND_SPACE: &str = "bound space";
/// Name of [`MechanicalForcesOp`].
pub const MECHANICAL_FORCES: &str = "mechanical forces";
/// Name of [`DiffusionOp`].
pub const DIFFUSION: &str = "diffusion";
/// Name of [`LoadBalancingOp`].
pub const LOAD_BALANCING: &str = "load balancing";
/// Name of [`TearDownIterationOp`].
pub const TEAR_DOWN_ITERATION: &str = "tear down iteration";

/// Operations that can never be unscheduled.
pub const PROTECTED_OPS: [&str; 3] = [SET_UP_ITERATION, UPDATE_ENVIRONMENT, TEAR_DOWN_ITERATION];
