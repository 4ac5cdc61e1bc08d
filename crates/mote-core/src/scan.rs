//! Prefix scans used for counting-sort style bucket assembly.
//!
//! The spatial grid builds its per-box agent lists by histogramming box
//! occupancy and turning the histogram into write offsets with
//! [`exclusive_prefix_sum`]. Commit paths use the same idiom to hand
//! out disjoint slot ranges to threads.

use std::ops::AddAssign;

use rayon::prelude::*;

/// Inputs shorter than this are scanned sequentially by
/// [`parallel_inclusive_scan`].
pub const PARALLEL_SCAN_CUTOFF: usize = 1 << 12;

/// In-place exclusive prefix sum. Returns the total.
///
/// `[3, 1, 4]` becomes `[0, 3, 4]` and `8` is returned. Allocate one
/// extra trailing element to keep the total inside the slice as well.
pub fn exclusive_prefix_sum<T>(v: &mut [T]) -> T
where
    T: Copy + Default + AddAssign,
{
    let mut running = T::default();
    for x in v.iter_mut() {
        let current = *x;
        *x = running;
        running += current;
    }
    running
}

/// In-place sequential inclusive prefix sum.
pub fn inclusive_prefix_sum<T>(v: &mut [T])
where
    T: Copy + AddAssign,
{
    for i in 1..v.len() {
        let prev = v[i - 1];
        v[i] += prev;
    }
}

/// Work-efficient parallel inclusive scan (up-sweep then down-sweep).
///
/// Runs on the rayon pool the caller is installed in. Falls back to
/// [`inclusive_prefix_sum`] below [`PARALLEL_SCAN_CUTOFF`] elements.
pub fn parallel_inclusive_scan<T>(v: &mut [T])
where
    T: Copy + AddAssign + Send + Sync,
{
    let n = v.len();
    if n < PARALLEL_SCAN_CUTOFF {
        inclusive_prefix_sum(v);
        return;
    }

    // Up-sweep: every stride-aligned block accumulates its two halves
    // into its last element.
    let mut strides = Vec::new();
    let mut level = 1u32;
    while let Some(stride) = 1usize.checked_shl(level) {
        if stride > n {
            break;
        }
        let half = stride / 2;
        v.par_chunks_exact_mut(stride).for_each(|block| {
            let left = block[half - 1];
            block[stride - 1] += left;
        });
        strides.push(stride);
        level += 1;
    }

    // Down-sweep: propagate block totals into the middle of the next
    // block, largest stride first.
    for &stride in strides.iter().rev() {
        let half = stride / 2;
        v[half..].par_chunks_exact_mut(stride).for_each(|block| {
            let carry = block[half - 1];
            block[stride - 1] += carry;
        });
    }
}
