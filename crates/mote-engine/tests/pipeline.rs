//! End-to-end behavior of the scheduler's operation pipeline.

use std::sync::{Arc, Mutex};

use mote_core::{Agent, AgentUid, Cell};
use mote_engine::ops::{self, MechanicalForcesOp};
use mote_engine::{ExecutionOrder, OpSpec, Operation, Param, Scheduler, SchedulerState, SimulationError};
use mote_resource::IterationStrategy;
use mote_space::BoundSpaceMode;
use mote_test_utils::fixtures::{
    CountingOp, DivideOp, DriftOp, FailingOp, MockDiffusionGrid, NeighborSumOp, RecordingOp, RemoveWhereOp,
};
use mote_test_utils::{line_of_cells, random_cells};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn param() -> Param {
    Param {
        num_threads: 4,
        ..Param::default()
    }
}

fn without_movement() -> Param {
    Param {
        unschedule_default_operations: vec![ops::MECHANICAL_FORCES.into(), ops::BOUND_SPACE.into()],
        ..param()
    }
}

fn scheduler(param: Param, cells: Vec<Cell>) -> Scheduler<Cell> {
    init_tracing();
    let mut sim = Scheduler::new(param).unwrap();
    for c in cells {
        sim.add_agent(c);
    }
    sim
}

fn position_of(sim: &Scheduler<Cell>, uid: AgentUid) -> [f64; 3] {
    sim.resource_manager().get_agent(uid).unwrap().position()
}

// ── Scheduling ──────────────────────────────────────────────────

#[test]
fn frequency_selects_steps() {
    let mut sim = scheduler(param(), line_of_cells(10));
    let (op, counters) = CountingOp::new("every third");
    sim.schedule_op(Operation::agent(op), OpSpec::main().with_frequency(3))
        .unwrap();
    sim.simulate(10).unwrap();

    // steps 0, 3, 6, 9
    assert_eq!(counters.set_ups(), 4);
    assert_eq!(counters.tear_downs(), 4);
    assert_eq!(counters.runs(), 40);
}

#[test]
fn stages_run_in_order() {
    let mut sim = scheduler(param(), line_of_cells(3));
    let log = Arc::new(Mutex::new(Vec::new()));
    sim.schedule_op(Operation::standalone(RecordingOp::new("post", &log)), OpSpec::post())
        .unwrap();
    sim.schedule_op(Operation::standalone(RecordingOp::new("main", &log)), OpSpec::main())
        .unwrap();
    sim.schedule_op(Operation::standalone(RecordingOp::new("pre", &log)), OpSpec::pre())
        .unwrap();
    sim.simulate(2).unwrap();

    let got: Vec<(String, u64)> = log.lock().unwrap().clone();
    let expected: Vec<(String, u64)> = [("pre", 0), ("main", 0), ("post", 0), ("pre", 1), ("main", 1), ("post", 1)]
        .into_iter()
        .map(|(n, s)| (n.to_string(), s))
        .collect();
    assert_eq!(got, expected);

    let names = sim.scheduled_op_names();
    let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
    assert!(pos(ops::TEAR_DOWN_ITERATION) < pos("post"));
}

#[test]
fn requests_apply_at_the_next_step() {
    let mut sim = scheduler(param(), line_of_cells(3));
    let log = Arc::new(Mutex::new(Vec::new()));
    sim.schedule_op(Operation::standalone(RecordingOp::new("probe", &log)), OpSpec::main())
        .unwrap();
    assert!(!sim.scheduled_op_names().contains(&"probe"));

    sim.simulate(2).unwrap();
    assert!(sim.scheduled_op_names().contains(&"probe"));

    sim.unschedule_op("probe").unwrap();
    assert!(sim.scheduled_op_names().contains(&"probe"));
    sim.simulate(2).unwrap();

    assert!(!sim.scheduled_op_names().contains(&"probe"));
    let steps: Vec<u64> = log.lock().unwrap().iter().map(|(_, s)| *s).collect();
    assert_eq!(steps, vec![0, 1]);
}

#[test]
fn protected_ops_survive_unscheduling() {
    let mut sim = scheduler(param(), line_of_cells(3));
    for name in ops::PROTECTED_OPS {
        assert_eq!(sim.unschedule_op(name), Ok(()));
    }
    sim.unschedule_op(ops::LOAD_BALANCING).unwrap();
    sim.simulate(1).unwrap();

    let names = sim.scheduled_op_names();
    for name in ops::PROTECTED_OPS {
        assert!(names.contains(&name));
    }
    assert!(!names.contains(&ops::LOAD_BALANCING));
}

// ── Agent phase ─────────────────────────────────────────────────

fn read_model(order: ExecutionOrder) -> Vec<f64> {
    let p = Param {
        execution_order: order,
        ..without_movement()
    };
    let cells = vec![
        Cell::with_diameter([0.0, 0.0, 0.0], 20.0),
        Cell::with_diameter([10.0, 0.0, 0.0], 20.0),
    ];
    let mut sim = scheduler(p, cells);
    let (observe, sums) = NeighborSumOp::new("observe", 200.0);
    sim.schedule_op(Operation::agent(DriftOp::new("drift", [1.0, 0.0, 0.0])), OpSpec::main())
        .unwrap();
    sim.schedule_op(Operation::agent(observe), OpSpec::main())
        .unwrap();
    sim.simulate(1).unwrap();

    let mut sums = sums.lock().unwrap().clone();
    sums.sort_by(f64::total_cmp);
    sums
}

#[test]
fn agent_major_order_reads_the_step_start_state() {
    assert_eq!(read_model(ExecutionOrder::ForEachAgentForEachOp), vec![0.0, 10.0]);
}

#[test]
fn op_major_order_reads_earlier_ops_results() {
    assert_eq!(read_model(ExecutionOrder::ForEachOpForEachAgent), vec![1.0, 11.0]);
}

#[test]
fn op_major_order_times_each_agent_op() {
    let p = Param {
        execution_order: ExecutionOrder::ForEachOpForEachAgent,
        ..param()
    };
    let mut sim = scheduler(p, line_of_cells(5));
    sim.simulate(1).unwrap();
    let m = sim.last_metrics();
    assert!(m.op_time(ops::BOUND_SPACE).is_some());
    assert!(m.op_time(ops::MECHANICAL_FORCES).is_some());
    assert!(m.op_time(ops::TEAR_DOWN_ITERATION).is_some());
}

// ── Births and removals ─────────────────────────────────────────

#[test]
fn births_and_removals_are_committed_at_tear_down() {
    let cells: Vec<Cell> = (0..4)
        .map(|i| Cell::new([i as f64 * 100.0, 0.0, 0.0]))
        .collect();
    let mut sim = scheduler(without_movement(), cells);
    sim.schedule_op(Operation::agent(DivideOp::new("divide", [0.0, 50.0, 0.0])), OpSpec::main())
        .unwrap();
    sim.simulate(1).unwrap();

    assert_eq!(sim.resource_manager().num_agents(), 8);
    assert_eq!(sim.last_metrics().added, 4);
    sim.resource_manager().check_invariants().unwrap();
    let mut uids = Vec::new();
    sim.resource_manager().for_each_agent(|a, _| uids.push(a.uid()));
    uids.sort();
    uids.dedup();
    assert_eq!(uids.len(), 8);

    sim.unschedule_op("divide").unwrap();
    sim.schedule_op(
        Operation::agent(RemoveWhereOp::new("cull", |c: &Cell| c.position()[1] > 25.0)),
        OpSpec::main(),
    )
    .unwrap();
    sim.simulate(1).unwrap();

    assert_eq!(sim.resource_manager().num_agents(), 4);
    assert_eq!(sim.last_metrics().removed, 4);
    sim.resource_manager().for_each_agent(|a, _| assert_eq!(a.position()[1], 0.0));
    sim.resource_manager().check_invariants().unwrap();
}

#[test]
fn births_across_numa_nodes_keep_storage_consistent() {
    let p = Param {
        num_threads: 4,
        numa_nodes: 2,
        iteration_strategy: IterationStrategy::Static,
        ..without_movement()
    };
    let mut sim = scheduler(p, random_cells(50, 500.0, 5.0, 11));
    sim.schedule_op(Operation::agent(DivideOp::new("divide", [1.0, 1.0, 1.0])), OpSpec::main().with_frequency(2))
        .unwrap();
    sim.simulate(5).unwrap();

    // divisions at steps 0, 2 and 4
    let rm = sim.resource_manager();
    assert_eq!(rm.num_agents(), 400);
    assert_eq!(rm.shards().iter().map(|s| s.len()).sum::<usize>(), 400);
    rm.check_invariants().unwrap();
}

// ── Time and lifecycle ──────────────────────────────────────────

#[test]
fn time_advances_by_the_time_step() {
    let p = Param {
        simulation_time_step: 0.5,
        ..param()
    };
    let mut sim = scheduler(p, line_of_cells(2));
    sim.simulate(3).unwrap();
    sim.simulate(1).unwrap();
    assert_eq!(sim.total_steps(), 4);
    assert_eq!(sim.simulated_time(), 2.0);
    assert_eq!(sim.state(), SchedulerState::Running);
}

#[test]
fn simulate_until_checks_before_each_step() {
    let mut sim = scheduler(param(), line_of_cells(2));
    sim.simulate_until(|s| s.total_steps() == 5).unwrap();
    assert_eq!(sim.total_steps(), 5);
    sim.simulate_until(|_| true).unwrap();
    assert_eq!(sim.total_steps(), 5);
}

#[test]
fn finished_simulation_refuses_to_run() {
    let mut sim = scheduler(param(), line_of_cells(2));
    sim.simulate(1).unwrap();
    sim.finish();
    assert_eq!(sim.simulate(1), Err(SimulationError::Terminated));
    assert_eq!(sim.simulate_until(|_| false), Err(SimulationError::Terminated));
    assert_eq!(sim.total_steps(), 1);
}

#[test]
fn failing_op_abandons_the_step() {
    let mut sim = scheduler(param(), line_of_cells(2));
    sim.schedule_op(Operation::standalone(FailingOp::new("fragile", 2)), OpSpec::main())
        .unwrap();
    let err = sim.simulate(5).unwrap_err();
    match err {
        SimulationError::OpFailed { name, source } => {
            assert_eq!(name, "fragile");
            assert_eq!(source.to_string(), "failing at step 2");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sim.total_steps(), 2);
}

#[test]
fn metrics_describe_the_last_step() {
    let mut sim = scheduler(param(), line_of_cells(6));
    sim.simulate(2).unwrap();
    let m = sim.last_metrics();
    assert_eq!(m.num_agents, 6);
    assert_eq!(m.added, 0);
    assert!(m.op_time(ops::UPDATE_ENVIRONMENT).is_some());
    assert!(m.op_time(ops::LOAD_BALANCING).is_some());
    // agent ops share one pass in agent-major order
    assert!(m.op_time(ops::MECHANICAL_FORCES).is_none());
}

// ── Built-in operations ─────────────────────────────────────────

#[test]
fn closed_space_clamps_at_initialization() {
    let p = Param {
        bound_space: BoundSpaceMode::Closed,
        min_bound: 0.0,
        max_bound: 100.0,
        ..param()
    };
    let mut sim = scheduler(p, Vec::new());
    let a = sim.add_agent(Cell::new([-5.0, 50.0, 50.0]));
    let b = sim.add_agent(Cell::new([150.0, 50.0, 50.0]));
    sim.initialize().unwrap();
    assert_eq!(sim.state(), SchedulerState::Initialized);
    assert_eq!(position_of(&sim, a), [0.0, 50.0, 50.0]);
    assert_eq!(position_of(&sim, b), [100.0, 50.0, 50.0]);
}

#[test]
fn torus_wraps_agents_that_leave() {
    let p = Param {
        bound_space: BoundSpaceMode::Torus,
        min_bound: 0.0,
        max_bound: 100.0,
        unschedule_default_operations: vec![ops::MECHANICAL_FORCES.into()],
        ..param()
    };
    let mut sim = scheduler(p, Vec::new());
    let a = sim.add_agent(Cell::new([50.0, 50.0, 50.0]));
    sim.simulate(1).unwrap();
    sim.resource_manager_mut()
        .get_agent_mut(a)
        .unwrap()
        .set_position([105.0, 50.0, -10.0]);
    sim.simulate(1).unwrap();
    assert_eq!(position_of(&sim, a), [5.0, 50.0, 90.0]);
}

#[test]
fn overlapping_cells_are_pushed_apart() {
    let mut sim = scheduler(param(), Vec::new());
    let a = sim.add_agent(Cell::new([0.0, 0.0, 0.0]));
    let b = sim.add_agent(Cell::new([4.0, 0.0, 0.0]));
    sim.simulate(10).unwrap();

    let pa = position_of(&sim, a);
    let pb = position_of(&sim, b);
    assert!(pb[0] - pa[0] > 4.0);
    assert!((pa[0] + pb[0] - 4.0).abs() < 1e-9);
    assert_eq!(pa[1], 0.0);
    assert_eq!(pb[2], 0.0);
}

#[test]
fn adherent_cells_stay_put() {
    let mut sim = scheduler(param(), Vec::new());
    let mut sticky = Cell::new([0.0, 0.0, 0.0]);
    sticky.set_adherence(1e6);
    let a = sim.add_agent(sticky);
    sim.add_agent(Cell::new([4.0, 0.0, 0.0]));
    sim.simulate(5).unwrap();
    assert_eq!(position_of(&sim, a), [0.0, 0.0, 0.0]);
}

#[test]
fn displacement_is_clamped() {
    let p = Param {
        simulation_time_step: 1.0,
        simulation_max_displacement: 0.25,
        ..param()
    };
    let mut sim = scheduler(p, Vec::new());
    let a = sim.add_agent(Cell::new([0.0, 0.0, 0.0]));
    sim.add_agent(Cell::new([1.0, 0.0, 0.0]));
    sim.simulate(1).unwrap();
    assert!((position_of(&sim, a)[0] + 0.25).abs() < 1e-12);
}

#[test]
fn mechanics_do_not_depend_on_thread_count() {
    let run = |threads: usize| {
        let p = Param {
            num_threads: threads,
            ..Param::default()
        };
        let mut sim = scheduler(p, random_cells(200, 60.0, 8.0, 3));
        sim.simulate(5).unwrap();
        let mut out = Vec::new();
        sim.resource_manager().for_each_agent(|a, _| out.push((a.uid(), a.position())));
        out.sort_by_key(|(uid, _)| *uid);
        out
    };
    assert_eq!(run(1), run(4));
}

#[test]
fn mechanical_radius_follows_largest_agent() {
    let mut sim = scheduler(
        Param {
            unschedule_default_operations: vec![ops::MECHANICAL_FORCES.into()],
            ..param()
        },
        vec![Cell::with_diameter([0.0; 3], 12.0), Cell::with_diameter([50.0, 0.0, 0.0], 30.0)],
    );
    sim.schedule_op(Operation::agent(MechanicalForcesOp::default()), OpSpec::main())
        .unwrap();
    sim.simulate(1).unwrap();
    assert_eq!(sim.grid().largest_object_size(), 30.0);
    assert_eq!(sim.grid().box_length(), 30);
}

#[test]
fn diffusion_grids_track_the_agent_grid() {
    let mut sim = scheduler(param(), Vec::new());
    let a = sim.add_agent(Cell::new([0.0, 0.0, 0.0]));
    let (grid, log) = MockDiffusionGrid::new("oxygen");
    sim.register_diffusion_grid(grid);
    sim.simulate(2).unwrap();
    {
        let log = log.lock().unwrap();
        assert_eq!(log.initialized, Some([-10, 20, -10, 20, -10, 20]));
        assert!(log.updates.is_empty());
        assert_eq!(log.steps, 2);
        assert!((log.elapsed - 0.02).abs() < 1e-12);
    }

    sim.resource_manager_mut()
        .get_agent_mut(a)
        .unwrap()
        .set_position([1000.0, 0.0, 0.0]);
    sim.simulate(1).unwrap();
    assert_eq!(log.lock().unwrap().updates, vec![[-10, 1020]]);
    assert_eq!(sim.diffusion_grids().len(), 1);
    assert_eq!(sim.diffusion_grids()[0].substance(), "oxygen");
}

#[test]
fn late_diffusion_grid_is_sized_on_registration() {
    let mut sim = scheduler(param(), line_of_cells(1));
    sim.simulate(1).unwrap();
    let (grid, log) = MockDiffusionGrid::new("glucose");
    sim.register_diffusion_grid(grid);
    assert_eq!(log.lock().unwrap().initialized, Some(sim.grid().dimensions()));
}
