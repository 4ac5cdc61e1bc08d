//! Exactly-once visitation and shard accounting across pool shapes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use mote_core::{Agent, Cell};
use mote_numa::{BlockTopology, NumaPool};
use mote_resource::{IterationStrategy, ResourceManager, StagedChanges};
use mote_test_utils::line_of_cells;

const THREAD_COUNTS: [usize; 4] = [1, 2, 8, 64];

fn pool(threads: usize, nodes: usize) -> NumaPool {
    NumaPool::new(threads, Arc::new(BlockTopology::new(nodes.min(threads)))).unwrap()
}

fn populated(pool: &NumaPool, n: usize) -> ResourceManager<Cell> {
    let mut rm = ResourceManager::for_pool(pool);
    for cell in line_of_cells(n) {
        rm.add_agent(cell);
    }
    // spread agents over every node
    let order: Vec<_> = {
        let mut v = Vec::with_capacity(n);
        rm.for_each_agent(|_, h| v.push(h));
        v
    };
    rm.sort_and_balance_numa_nodes(pool, &order).unwrap();
    rm
}

fn visit_counts(rm: &ResourceManager<Cell>, pool: &NumaPool, strategy: IterationStrategy) -> Vec<u32> {
    let hits: Vec<AtomicU32> = (0..rm.num_agents()).map(|_| AtomicU32::new(0)).collect();
    rm.for_each_parallel(pool, strategy, |agent, _| {
        hits[agent.uid().index() as usize].fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();
    hits.into_iter().map(|h| h.into_inner()).collect()
}

#[test]
fn read_only_traversals_visit_each_agent_once() {
    for threads in THREAD_COUNTS {
        for nodes in 1..=4 {
            let pool = pool(threads, nodes);
            let rm = populated(&pool, 1013);
            for strategy in [
                IterationStrategy::Static,
                IterationStrategy::Dynamic { batch_size: 1 },
                IterationStrategy::Dynamic { batch_size: 7 },
                IterationStrategy::Dynamic { batch_size: 1000 },
            ] {
                let counts = visit_counts(&rm, &pool, strategy);
                assert_eq!(counts.len(), 1013);
                assert!(
                    counts.iter().all(|c| *c == 1),
                    "{threads} threads, {nodes} nodes, {strategy:?}"
                );
            }
        }
    }
}

#[test]
fn mutable_traversals_visit_each_agent_once() {
    for threads in THREAD_COUNTS {
        let pool = pool(threads, 2);
        let mut rm = populated(&pool, 500);
        rm.apply_parallel(&pool, IterationStrategy::Static, |agent, _| {
            let mut p = agent.position();
            p[1] += 1.0;
            agent.set_position(p);
        })
        .unwrap();
        rm.apply_parallel(&pool, IterationStrategy::Dynamic { batch_size: 3 }, |agent, _| {
            let mut p = agent.position();
            p[2] += 1.0;
            agent.set_position(p);
        })
        .unwrap();
        rm.for_each_agent(|agent, _| {
            assert_eq!(agent.position()[1], 1.0);
            assert_eq!(agent.position()[2], 1.0);
        });
    }
}

#[test]
fn handles_passed_to_callbacks_resolve_to_the_visited_agent() {
    let pool = pool(8, 3);
    let rm = populated(&pool, 300);
    rm.for_each_parallel(&pool, IterationStrategy::Dynamic { batch_size: 5 }, |agent, handle| {
        assert_eq!(rm.agent_at(handle).unwrap().uid(), agent.uid());
    })
    .unwrap();
}

#[test]
fn empty_population_is_fine() {
    let pool = pool(8, 2);
    let rm: ResourceManager<Cell> = ResourceManager::for_pool(&pool);
    let counts = visit_counts(&rm, &pool, IterationStrategy::Static);
    assert!(counts.is_empty());
    rm.for_each_parallel(&pool, IterationStrategy::Dynamic { batch_size: 10 }, |_, _| {
        panic!("no agents to visit")
    })
    .unwrap();
}

#[test]
fn shard_mismatch_is_reported() {
    let pool = pool(4, 2);
    let rm: ResourceManager<Cell> = ResourceManager::new(3);
    assert!(rm
        .for_each_parallel(&pool, IterationStrategy::Static, |_, _| {})
        .is_err());
}

#[test]
fn shard_sum_matches_agent_count_after_every_commit() {
    let pool = pool(8, 4);
    let mut rm = populated(&pool, 200);
    let staged = StagedChanges::new(pool.num_threads());
    for step in 0..5u32 {
        {
            let rm = &rm;
            let staged = &staged;
            rm.for_each_parallel(&pool, IterationStrategy::Dynamic { batch_size: 4 }, |agent, _| {
                let uid = agent.uid();
                if uid.index() % 5 == step {
                    staged.stage_removal(uid);
                } else if uid.index() % 7 == step {
                    let mut child = agent.clone();
                    child.set_uid(rm.generate_uid());
                    staged.stage_new(child);
                }
            })
            .unwrap();
        }
        rm.commit(&staged, pool.thread_info()).unwrap();
        let shard_sum: usize = rm.shards().iter().map(|s| s.len()).sum();
        assert_eq!(shard_sum, rm.num_agents());
        assert_eq!(shard_sum, rm.uid_map().live());
        rm.check_invariants().unwrap();
    }
}

#[test]
fn defragmentation_follows_watermarks() {
    let mut rm: ResourceManager<Cell> = ResourceManager::new(1);
    let (low, high) = (0.3, 0.8);

    rm.add_agent(Cell::new([0.0; 3]));
    rm.end_of_iteration(low, high);
    assert!(rm.uid_generator().is_in_defragmentation_mode());

    // fill the map until reuse runs out
    let mut cnt: u64 = 1;
    while rm.uid_generator().is_in_defragmentation_mode() {
        rm.add_agent(Cell::new([0.0; 3]));
        cnt += 1;
    }
    rm.end_of_iteration(low, high);
    assert!(!rm.uid_generator().is_in_defragmentation_mode());

    // drop below the low watermark
    let mut remove = (cnt as f64 * 0.7).ceil() as u64 + 1;
    while remove != 0 {
        remove -= 1;
        rm.remove_agent((remove as u32).into()).unwrap();
    }
    rm.end_of_iteration(low, high);
    assert!(rm.uid_generator().is_in_defragmentation_mode());

    // climb past the high watermark
    let mut add = (cnt as f64 * 0.5).ceil() as u64 + 1;
    while add != 0 {
        add -= 1;
        rm.add_agent(Cell::new([0.0; 3]));
    }
    rm.end_of_iteration(low, high);
    assert!(!rm.uid_generator().is_in_defragmentation_mode());

    let uid = rm.generate_uid();
    assert!(uid.index() as u64 >= cnt);
    assert_eq!(uid.reused(), 0);
    rm.check_invariants().unwrap();
}

#[test]
fn reused_uids_do_not_resolve_old_agents() {
    let mut rm: ResourceManager<Cell> = ResourceManager::new(1);
    let old = rm.add_agent(Cell::new([1.0; 3]));
    rm.remove_agent(old).unwrap();
    rm.end_of_iteration(0.5, 0.9);
    let new = rm.add_agent(Cell::new([2.0; 3]));
    assert_eq!(new.index(), old.index());
    assert_eq!(new.reused(), old.reused() + 1);
    assert!(rm.get_agent(old).is_none());
    assert_eq!(rm.get_agent(new).unwrap().position(), [2.0; 3]);
}
