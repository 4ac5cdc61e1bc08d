//! Simulation parameters, validation, and error types.
//!
//! [`Param`] is read-only once a [`Scheduler`](crate::Scheduler) has been
//! built from it. [`validate()`](Param::validate) checks every field at
//! construction; the scheduler refuses to start with an invalid `Param`.

use std::error::Error;
use std::fmt;

use mote_resource::IterationStrategy;
use mote_space::{BoundSpaceMode, GridConfig};

// ── ExecutionOrder ──────────────────────────────────────────────

/// How agent operations are interleaved within a step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExecutionOrder {
    /// One parallel pass; each agent runs all due operations in turn.
    #[default]
    ForEachAgentForEachOp,
    /// One parallel pass per operation. Later operations see the effects
    /// of earlier ones on every agent.
    ForEachOpForEachAgent,
}

// ── ConfigError ─────────────────────────────────────────────────

/// Errors detected by [`Param::validate()`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// `min_bound` is not below `max_bound`, or either is not finite.
    InvalidBounds {
        /// Configured lower bound.
        min: f64,
        /// Configured upper bound.
        max: f64,
    },
    /// `simulation_time_step` is not finite and positive.
    InvalidTimeStep {
        /// The invalid value.
        value: f64,
    },
    /// `simulation_max_displacement` is negative or not finite.
    InvalidMaxDisplacement {
        /// The invalid value.
        value: f64,
    },
    /// Watermarks outside `[0, 1]` or `low > high`.
    InvalidWatermarks {
        /// Configured low watermark.
        low: f64,
        /// Configured high watermark.
        high: f64,
    },
    /// `num_threads` is zero.
    ZeroThreads,
    /// `numa_nodes` is zero or exceeds `num_threads`.
    InvalidNumaNodes {
        /// Configured node count.
        nodes: usize,
        /// Configured thread count.
        threads: usize,
    },
    /// Dynamic iteration with a batch size of zero.
    ZeroBatchSize,
    /// A fixed box length of zero.
    ZeroBoxLength,
    /// `load_balancing_frequency` is zero.
    ZeroLoadBalancingFrequency,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBounds { min, max } => {
                write!(f, "bounds must be finite with min < max, got [{min}, {max}]")
            }
            Self::InvalidTimeStep { value } => {
                write!(f, "simulation_time_step must be finite and positive, got {value}")
            }
            Self::InvalidMaxDisplacement { value } => write!(
                f,
                "simulation_max_displacement must be finite and non-negative, got {value}"
            ),
            Self::InvalidWatermarks { low, high } => write!(
                f,
                "defragmentation watermarks must satisfy 0 <= low <= high <= 1, got {low} and {high}"
            ),
            Self::ZeroThreads => write!(f, "num_threads must be at least 1"),
            Self::InvalidNumaNodes { nodes, threads } => {
                write!(f, "numa_nodes must be in [1, {threads}], got {nodes}")
            }
            Self::ZeroBatchSize => write!(f, "dynamic iteration batch size must be at least 1"),
            Self::ZeroBoxLength => write!(f, "fixed box length must be at least 1"),
            Self::ZeroLoadBalancingFrequency => {
                write!(f, "load_balancing_frequency must be at least 1")
            }
        }
    }
}

impl Error for ConfigError {}

// ── Param ───────────────────────────────────────────────────────

/// Simulation parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    /// Boundary behavior of the domain. Default: `Open`.
    pub bound_space: BoundSpaceMode,
    /// Lower domain bound for closed and torus spaces. Default: 0.
    pub min_bound: f64,
    /// Upper domain bound for closed and torus spaces. Default: 100.
    pub max_bound: f64,
    /// Simulated time added per step. Default: 0.01.
    pub simulation_time_step: f64,
    /// Largest distance an agent may move in one step. Default: 3.
    pub simulation_max_displacement: f64,
    /// Uid map utilization below which free uid slots are reused. Default: 0.5.
    pub agent_uid_defragmentation_low_watermark: f64,
    /// Uid map utilization above which slot reuse stops. Default: 0.9.
    pub agent_uid_defragmentation_high_watermark: f64,
    /// Worker threads. Default: available parallelism.
    pub num_threads: usize,
    /// NUMA nodes the workers are split over. Default: 1.
    pub numa_nodes: usize,
    /// Traversal of parallel agent phases. Default: dynamic, batches of 1000.
    pub iteration_strategy: IterationStrategy,
    /// Interleaving of agent operations. Default: agent-major.
    pub execution_order: ExecutionOrder,
    /// Seed of the simulation RNG. Default: 4357.
    pub random_seed: u64,
    /// Fixed grid box length. Default: `None` (largest agent diameter).
    pub box_length: Option<u32>,
    /// Steps between NUMA rebalances. Default: 1.
    pub load_balancing_frequency: u64,
    /// Default operations that are not scheduled. Protected operations
    /// listed here are scheduled anyway.
    pub unschedule_default_operations: Vec<String>,
}

impl Param {
    /// Default lower domain bound.
    pub const DEFAULT_MIN_BOUND: f64 = 0.0;
    /// Default upper domain bound.
    pub const DEFAULT_MAX_BOUND: f64 = 100.0;
    /// Default time step.
    pub const DEFAULT_TIME_STEP: f64 = 0.01;
    /// Default displacement clamp.
    pub const DEFAULT_MAX_DISPLACEMENT: f64 = 3.0;
    /// Default low defragmentation watermark.
    pub const DEFAULT_LOW_WATERMARK: f64 = 0.5;
    /// Default high defragmentation watermark.
    pub const DEFAULT_HIGH_WATERMARK: f64 = 0.9;
    /// Default RNG seed.
    pub const DEFAULT_RANDOM_SEED: u64 = 4357;

    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_bound.is_finite() || !self.max_bound.is_finite() || self.min_bound >= self.max_bound {
            return Err(ConfigError::InvalidBounds {
                min: self.min_bound,
                max: self.max_bound,
            });
        }
        if !self.simulation_time_step.is_finite() || self.simulation_time_step <= 0.0 {
            return Err(ConfigError::InvalidTimeStep {
                value: self.simulation_time_step,
            });
        }
        if !self.simulation_max_displacement.is_finite() || self.simulation_max_displacement < 0.0 {
            return Err(ConfigError::InvalidMaxDisplacement {
                value: self.simulation_max_displacement,
            });
        }
        let low = self.agent_uid_defragmentation_low_watermark;
        let high = self.agent_uid_defragmentation_high_watermark;
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
            return Err(ConfigError::InvalidWatermarks { low, high });
        }
        if self.num_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.numa_nodes == 0 || self.numa_nodes > self.num_threads {
            return Err(ConfigError::InvalidNumaNodes {
                nodes: self.numa_nodes,
                threads: self.num_threads,
            });
        }
        if self.iteration_strategy == (IterationStrategy::Dynamic { batch_size: 0 }) {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.box_length == Some(0) {
            return Err(ConfigError::ZeroBoxLength);
        }
        if self.load_balancing_frequency == 0 {
            return Err(ConfigError::ZeroLoadBalancingFrequency);
        }
        Ok(())
    }

    /// Grid settings derived from these parameters.
    pub fn grid_config(&self) -> GridConfig {
        GridConfig {
            bound_space: self.bound_space,
            min_bound: self.min_bound,
            max_bound: self.max_bound,
            box_length: self.box_length,
            iteration: self.iteration_strategy,
        }
    }
}

impl Default for Param {
    fn default() -> Self {
        Self {
            bound_space: BoundSpaceMode::Open,
            min_bound: Self::DEFAULT_MIN_BOUND,
            max_bound: Self::DEFAULT_MAX_BOUND,
            simulation_time_step: Self::DEFAULT_TIME_STEP,
            simulation_max_displacement: Self::DEFAULT_MAX_DISPLACEMENT,
            agent_uid_defragmentation_low_watermark: Self::DEFAULT_LOW_WATERMARK,
            agent_uid_defragmentation_high_watermark: Self::DEFAULT_HIGH_WATERMARK,
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            numa_nodes: 1,
            iteration_strategy: IterationStrategy::default(),
            execution_order: ExecutionOrder::default(),
            random_seed: Self::DEFAULT_RANDOM_SEED,
            box_length: None,
            load_balancing_frequency: 1,
            unschedule_default_operations: Vec::new(),
        }
    }
}
