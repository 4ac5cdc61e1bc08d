//! Per-step performance metrics.
//!
//! [`StepMetrics`] captures timing and population data for a single step.

/// Timing and population metrics collected during a single step.
///
/// All durations are in microseconds. The scheduler fills these after
/// each step; read the latest with
/// [`Scheduler::last_metrics()`](crate::Scheduler::last_metrics).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step.
    pub total_us: u64,
    /// Time spent in the agent phase, snapshots included.
    pub agent_phase_us: u64,
    /// Per-operation execution times: `(name, microseconds)`, in execution
    /// order. Agent operations appear individually only when they run one
    /// pass per operation.
    pub op_us: Vec<(String, u64)>,
    /// Live agents after the step.
    pub num_agents: usize,
    /// Agents inserted by this step's commits.
    pub added: usize,
    /// Agents removed by this step's commits.
    pub removed: usize,
}

impl StepMetrics {
    /// Time recorded for operation `name`, if it ran.
    pub fn op_time(&self, name: &str) -> Option<u64> {
        self.op_us.iter().find(|(n, _)| n == name).map(|(_, us)| *us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = StepMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.agent_phase_us, 0);
        assert!(m.op_us.is_empty());
        assert_eq!(m.num_agents, 0);
        assert_eq!(m.added, 0);
        assert_eq!(m.removed, 0);
    }

    #[test]
    fn op_time_finds_recorded_ops() {
        let m = StepMetrics {
            op_us: vec![("diffusion".into(), 42), ("load balancing".into(), 7)],
            ..StepMetrics::default()
        };
        assert_eq!(m.op_time("load balancing"), Some(7));
        assert_eq!(m.op_time("mechanical forces"), None);
    }
}
