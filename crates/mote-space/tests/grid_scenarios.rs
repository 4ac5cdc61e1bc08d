//! Grid construction, neighbor search and Z-order on regular lattices.

use std::sync::Arc;

use mote_core::{Agent, AgentUid, Cell};
use mote_numa::{BlockTopology, NumaPool};
use mote_resource::{LocalityOrder, ResourceManager};
use mote_space::{BoundSpaceMode, GridConfig, UniformGrid};
use mote_test_utils::{cubic_lattice, populate};

// Lattice spacing 20: direct, face-diagonal and space-diagonal neighbors
// are at squared distances 400, 800 and 1200.
const SQUARED_RADIUS: f64 = 1201.0;

fn pool() -> NumaPool {
    NumaPool::single_node(4).unwrap()
}

fn lattice(pool: &NumaPool, n: usize) -> (ResourceManager<Cell>, Vec<AgentUid>) {
    let mut rm = ResourceManager::for_pool(pool);
    let uids = populate(&mut rm, cubic_lattice(n, 20.0, 30.0));
    (rm, uids)
}

fn neighbors_of(grid: &UniformGrid, rm: &ResourceManager<Cell>, uids: &[AgentUid], i: usize) -> Vec<usize> {
    let query = rm.get_agent(uids[i]).unwrap();
    let mut out: Vec<usize> = grid
        .neighbor_uids(rm.shards(), query, SQUARED_RADIUS)
        .into_iter()
        .map(|uid| uids.iter().position(|u| *u == uid).unwrap())
        .collect();
    out.sort_unstable();
    out
}

#[test]
fn lattice_neighbors_cover_the_moore_block() {
    let pool = pool();
    let (mut rm, uids) = lattice(&pool, 4);
    let mut grid = UniformGrid::new(GridConfig::default());
    grid.update(&mut rm, &pool).unwrap();

    assert_eq!(neighbors_of(&grid, &rm, &uids, 0), vec![1, 4, 5, 16, 17, 20, 21]);
    assert_eq!(
        neighbors_of(&grid, &rm, &uids, 4),
        vec![0, 1, 5, 8, 9, 16, 17, 20, 21, 24, 25]
    );
}

#[test]
fn removed_agents_disappear_after_rebuild() {
    let pool = pool();
    let (mut rm, uids) = lattice(&pool, 4);
    let mut grid = UniformGrid::new(GridConfig::default());
    grid.update(&mut rm, &pool).unwrap();

    rm.remove_agent(uids[1]).unwrap();
    rm.remove_agent(uids[42]).unwrap();
    grid.update(&mut rm, &pool).unwrap();

    assert_eq!(neighbors_of(&grid, &rm, &uids, 0), vec![4, 5, 16, 17, 20, 21]);
    assert_eq!(grid.num_agents(), 62);
}

#[test]
fn neighbor_search_excludes_the_query() {
    let pool = pool();
    let (mut rm, uids) = lattice(&pool, 3);
    let mut grid = UniformGrid::new(GridConfig::default());
    grid.update(&mut rm, &pool).unwrap();
    for i in 0..uids.len() {
        assert!(!neighbors_of(&grid, &rm, &uids, i).contains(&i));
    }
    // the center agent sees the whole lattice
    assert_eq!(neighbors_of(&grid, &rm, &uids, 13).len(), 26);
}

#[test]
fn lattice_dimensions_and_box_geometry() {
    let pool = pool();
    let (mut rm, _) = lattice(&pool, 3);
    let mut grid = UniformGrid::new(GridConfig::default());
    grid.update(&mut rm, &pool).unwrap();

    assert_eq!(grid.box_length(), 30);
    assert_eq!(grid.dimensions(), [-30, 90, -30, 90, -30, 90]);
    assert_eq!(grid.num_boxes_axis(), [4, 4, 4]);

    assert_eq!(grid.get_box_index([0.0, 0.0, 0.0]), 21);
    assert_eq!(grid.get_box_index([1e-15, 1e-15, 1e-15]), 21);
    assert_eq!(grid.get_box_index([-1e-15, 1e-15, 1e-15]), 20);

    assert_eq!(grid.get_box_coordinates(3), [3, 0, 0]);
    assert_eq!(grid.get_box_coordinates(9), [1, 2, 0]);
    assert_eq!(grid.get_box_coordinates(57), [1, 2, 3]);
    assert_eq!(grid.get_box_index_of([1, 2, 3]), 57);
}

#[test]
fn moving_an_agent_outwards_grows_the_grid() {
    let pool = pool();
    let (mut rm, uids) = lattice(&pool, 3);
    let mut grid = UniformGrid::new(GridConfig::default());
    grid.update(&mut rm, &pool).unwrap();
    grid.update(&mut rm, &pool).unwrap();
    assert!(!grid.has_grown());

    rm.get_agent_mut(uids[0]).unwrap().set_position([100.0, 0.0, 0.0]);
    grid.update(&mut rm, &pool).unwrap();

    assert_eq!(grid.dimensions(), [-30, 150, -30, 90, -30, 90]);
    assert!(grid.has_grown());
    assert_eq!(grid.dimension_thresholds(), [-30, 150]);
}

#[test]
fn z_order_walks_octants_of_the_lattice() {
    let pool = pool();
    let (mut rm, uids) = lattice(&pool, 3);
    let mut grid = UniformGrid::new(GridConfig::default());
    grid.update(&mut rm, &pool).unwrap();

    let mut visited = Vec::new();
    grid.iterate_z_order(|h| {
        let uid = rm.agent_at(h).unwrap().uid();
        visited.push(uids.iter().position(|u| *u == uid).unwrap());
    });
    assert_eq!(visited.len(), 27);

    let expected: [&[usize]; 8] = [
        &[0, 1, 3, 4, 9, 10, 12, 13],
        &[2, 5, 11, 14],
        &[6, 7, 15, 16],
        &[8, 17],
        &[18, 19, 21, 22],
        &[20, 23],
        &[24, 25],
        &[26],
    ];
    let mut at = 0;
    for group in expected {
        let mut got = visited[at..at + group.len()].to_vec();
        got.sort_unstable();
        assert_eq!(got, group);
        at += group.len();
    }
}

#[test]
fn z_order_ranges_match_full_walk() {
    let pool = pool();
    let (mut rm, _) = lattice(&pool, 4);
    let mut grid = UniformGrid::new(GridConfig::default());
    grid.update(&mut rm, &pool).unwrap();

    let order = grid.z_order();
    assert_eq!(order.len(), 64);
    let mut full = Vec::new();
    order.for_each(|h| full.push(h));

    for (start, count) in [(0, 64), (0, 1), (5, 11), (17, 30), (63, 1), (40, 0)] {
        let mut part = Vec::new();
        order.visit_range(start, count, &mut |h| part.push(h));
        assert_eq!(part, full[start..start + count]);
    }
}

#[test]
fn bounded_space_thresholds_follow_bounds() {
    let pool = pool();
    let (mut rm, _) = lattice(&pool, 3);
    let mut grid = UniformGrid::new(GridConfig {
        bound_space: BoundSpaceMode::Closed,
        min_bound: 1.0,
        max_bound: 99.0,
        ..GridConfig::default()
    });
    grid.update(&mut rm, &pool).unwrap();
    assert_eq!(grid.dimension_thresholds(), [1, 99]);
}

#[test]
fn fixed_box_length_persists_across_updates() {
    let pool = pool();
    let (mut rm, uids) = lattice(&pool, 3);
    let mut grid = UniformGrid::new(GridConfig::default());
    grid.set_box_length(Some(15));
    grid.update(&mut rm, &pool).unwrap();
    assert_eq!(grid.box_length(), 15);

    rm.get_agent_mut(uids[5]).unwrap().set_diameter(80.0);
    grid.update(&mut rm, &pool).unwrap();
    assert_eq!(grid.box_length(), 15);
    assert_eq!(grid.largest_object_size(), 80.0);
}

#[test]
fn grid_build_is_independent_of_node_count() {
    let one = NumaPool::single_node(4).unwrap();
    let four = NumaPool::new(4, Arc::new(BlockTopology::new(4))).unwrap();
    let mut results = Vec::new();
    for pool in [&one, &four] {
        let (mut rm, uids) = lattice(pool, 4);
        let order: Vec<_> = {
            let mut v = Vec::new();
            rm.for_each_agent(|_, h| v.push(h));
            v
        };
        rm.sort_and_balance_numa_nodes(pool, &order).unwrap();
        let mut grid = UniformGrid::new(GridConfig::default());
        grid.update(&mut rm, pool).unwrap();
        let all: Vec<Vec<usize>> = (0..uids.len()).map(|i| neighbors_of(&grid, &rm, &uids, i)).collect();
        results.push((grid.dimensions(), all));
    }
    assert_eq!(results[0], results[1]);
}
