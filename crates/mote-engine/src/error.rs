//! Error types for scheduling and simulation.

use std::error::Error;
use std::fmt;

use mote_numa::NumaError;
use mote_resource::ResourceError;
use mote_space::GridError;

use crate::param::ConfigError;

// ── ScheduleError ───────────────────────────────────────────────

/// Errors from operation registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    /// An operation with this name is already scheduled.
    DuplicateOp {
        /// The name in use.
        name: String,
    },
    /// No scheduled operation has this name.
    UnknownOp {
        /// The requested name.
        name: String,
    },
    /// Agent operations run only in the main stage.
    AgentOpOutsideMain {
        /// The rejected operation.
        name: String,
    },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateOp { name } => write!(f, "operation '{name}' is already scheduled"),
            Self::UnknownOp { name } => write!(f, "no scheduled operation named '{name}'"),
            Self::AgentOpOutsideMain { name } => write!(
                f,
                "agent operation '{name}' can only be scheduled in the main stage"
            ),
        }
    }
}

impl Error for ScheduleError {}

// ── SimulationError ─────────────────────────────────────────────

/// Everything that can stop a simulation step.
#[derive(Debug, PartialEq)]
pub enum SimulationError {
    /// Invalid parameters.
    Config(ConfigError),
    /// Thread pool or topology failure.
    Numa(NumaError),
    /// Agent storage invariant violated.
    Resource(ResourceError),
    /// Grid construction failed.
    Grid(GridError),
    /// Operation registration failed.
    Schedule(ScheduleError),
    /// A standalone operation failed; the step was abandoned.
    OpFailed {
        /// Name of the failing operation.
        name: String,
        /// What went wrong.
        source: Box<SimulationError>,
    },
    /// Failure reported by user code.
    Custom {
        /// Description of the failure.
        reason: String,
    },
    /// The scheduler was finished; no further steps can run.
    Terminated,
}

impl SimulationError {
    /// A [`Custom`](Self::Custom) error.
    pub fn custom(reason: impl Into<String>) -> Self {
        Self::Custom {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Numa(e) => write!(f, "numa: {e}"),
            Self::Resource(e) => write!(f, "resource: {e}"),
            Self::Grid(e) => write!(f, "grid: {e}"),
            Self::Schedule(e) => write!(f, "schedule: {e}"),
            Self::OpFailed { name, source } => write!(f, "operation '{name}' failed: {source}"),
            Self::Custom { reason } => f.write_str(reason),
            Self::Terminated => write!(f, "simulation has been terminated"),
        }
    }
}

impl Error for SimulationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Numa(e) => Some(e),
            Self::Resource(e) => Some(e),
            Self::Grid(e) => Some(e),
            Self::Schedule(e) => Some(e),
            Self::OpFailed { source, .. } => Some(source.as_ref()),
            Self::Custom { .. } | Self::Terminated => None,
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<NumaError> for SimulationError {
    fn from(e: NumaError) -> Self {
        Self::Numa(e)
    }
}

impl From<ResourceError> for SimulationError {
    fn from(e: ResourceError) -> Self {
        Self::Resource(e)
    }
}

impl From<GridError> for SimulationError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

impl From<ScheduleError> for SimulationError {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}
