//! Morton (Z-order) traversal of the grid.
//!
//! Interleaving the bits of a box's `x`, `y`, `z` coordinates yields a
//! space-filling curve: boxes close on the curve are close in space. The
//! resource manager copies agents in this order when it rebalances, so
//! that agents interacting with each other end up close in memory.

use mote_core::{binary_search, exclusive_prefix_sum, AgentHandle};
use mote_resource::LocalityOrder;

use crate::grid::UniformGrid;

/// Spread the low 21 bits of `v` so that bit `i` lands on bit `3i`.
fn spread(v: u32) -> u64 {
    let mut x = u64::from(v) & 0x1f_ffff;
    x = (x | x << 32) & 0x001f_0000_0000_ffff;
    x = (x | x << 16) & 0x001f_0000_ff00_00ff;
    x = (x | x << 8) & 0x100f_00f0_0f00_f00f;
    x = (x | x << 4) & 0x10c3_0c30_c30c_30c3;
    x = (x | x << 2) & 0x1249_2492_4924_9249;
    x
}

/// Morton code of box coordinates `[x, y, z]`: `x` on bit 0, `y` on bit 1
/// and `z` on bit 2 of every 3-bit group.
///
/// Coordinates are truncated to 21 bits.
///
/// ```
/// use mote_space::morton_code;
///
/// assert_eq!(morton_code([1, 0, 0]), 0b001);
/// assert_eq!(morton_code([0, 1, 0]), 0b010);
/// assert_eq!(morton_code([0, 0, 1]), 0b100);
/// assert_eq!(morton_code([2, 1, 1]), 0b1110);
/// ```
pub fn morton_code(c: [u32; 3]) -> u64 {
    spread(c[0]) | spread(c[1]) << 1 | spread(c[2]) << 2
}

/// The populated boxes of a grid in Morton order, with agent offsets.
///
/// Position `i` of the order is the `i`-th agent met when walking the
/// boxes along the curve. Empty boxes are skipped.
#[derive(Debug)]
pub struct ZOrder<'a> {
    grid: &'a UniformGrid,
    boxes: Vec<usize>,
    offsets: Vec<usize>,
}

impl<'a> ZOrder<'a> {
    fn new(grid: &'a UniformGrid) -> Self {
        let mut keyed: Vec<(u64, usize)> = (0..grid.num_boxes())
            .filter(|&b| grid.box_len(b) > 0)
            .map(|b| (morton_code(grid.get_box_coordinates(b)), b))
            .collect();
        keyed.sort_unstable();
        let boxes: Vec<usize> = keyed.into_iter().map(|(_, b)| b).collect();
        let mut offsets: Vec<usize> = boxes.iter().map(|&b| grid.box_len(b)).collect();
        offsets.push(0);
        exclusive_prefix_sum(&mut offsets);
        Self {
            grid,
            boxes,
            offsets,
        }
    }

    /// Populated box indices, in curve order.
    pub fn boxes(&self) -> &[usize] {
        &self.boxes
    }

    /// Number of agents before each box in curve order; one trailing
    /// entry holds the total.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Visit every agent in curve order.
    pub fn for_each(&self, mut f: impl FnMut(AgentHandle)) {
        for &b in &self.boxes {
            self.grid.box_agents(b).iter().copied().for_each(&mut f);
        }
    }
}

impl LocalityOrder for ZOrder<'_> {
    fn len(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn visit_range(&self, start: usize, count: usize, f: &mut dyn FnMut(AgentHandle)) {
        if count == 0 || self.boxes.is_empty() {
            return;
        }
        let mut b = binary_search(&self.offsets, &start, 0, self.boxes.len() - 1);
        let mut skip = start - self.offsets[b];
        let mut left = count;
        while left > 0 && b < self.boxes.len() {
            let agents = &self.grid.box_agents(self.boxes[b])[skip..];
            for &h in agents.iter().take(left) {
                f(h);
            }
            left = left.saturating_sub(agents.len());
            skip = 0;
            b += 1;
        }
    }
}

impl UniformGrid {
    /// Z-order over the boxes populated at the last build.
    pub fn z_order(&self) -> ZOrder<'_> {
        ZOrder::new(self)
    }

    /// Visit every agent box by box in Morton order.
    pub fn iterate_z_order(&self, f: impl FnMut(AgentHandle)) {
        self.z_order().for_each(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morton_sorts_unit_cube_corners() {
        let mut corners: Vec<[u32; 3]> = (0..8).map(|i| [i & 1, (i >> 1) & 1, i >> 2]).collect();
        corners.reverse();
        corners.sort_by_key(|&c| morton_code(c));
        assert_eq!(corners[0], [0, 0, 0]);
        assert_eq!(corners[1], [1, 0, 0]);
        assert_eq!(corners[2], [0, 1, 0]);
        assert_eq!(corners[7], [1, 1, 1]);
    }

    #[test]
    fn morton_uses_high_bits() {
        let max = (1 << 21) - 1;
        assert_eq!(morton_code([max, max, max]), (1u64 << 63) - 1);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn naive(c: [u32; 3]) -> u64 {
            let mut code = 0u64;
            for bit in 0..21 {
                for (axis, v) in c.iter().enumerate() {
                    code |= u64::from((v >> bit) & 1) << (3 * bit + axis);
                }
            }
            code
        }

        proptest! {
            #[test]
            fn matches_bitwise_interleave(x in 0u32..1 << 21, y in 0u32..1 << 21, z in 0u32..1 << 21) {
                prop_assert_eq!(morton_code([x, y, z]), naive([x, y, z]));
            }
        }
    }
}
