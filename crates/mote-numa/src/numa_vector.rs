//! Growable per-NUMA-node storage with parallel construction.

use std::ops::{Deref, DerefMut, Range};

use mote_core::NumaNodeId;

use crate::error::NumaError;
use crate::pool::NumaPool;
use crate::raw::{self, FillTarget};

/// A resizable array that lives on one NUMA node.
///
/// Behaves like a `Vec<T>` (it derefs to a slice) but grows by
/// [`GROWTH_FACTOR`](NumaVector::GROWTH_FACTOR) and offers parallel fills
/// in which the node's own threads write the node's slots.
#[derive(Clone, Debug, PartialEq)]
pub struct NumaVector<T> {
    data: Vec<T>,
    numa_node: NumaNodeId,
}

impl<T> NumaVector<T> {
    /// Capacity multiplier applied when a push finds the buffer full.
    pub const GROWTH_FACTOR: f64 = 1.5;

    /// An empty vector tagged with `numa_node`.
    pub fn new(numa_node: NumaNodeId) -> Self {
        Self {
            data: Vec::new(),
            numa_node,
        }
    }

    /// An empty vector with room for `capacity` elements.
    pub fn with_capacity(numa_node: NumaNodeId, capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            numa_node,
        }
    }

    /// The node this storage belongs to.
    pub fn numa_node(&self) -> NumaNodeId {
        self.numa_node
    }

    /// Number of elements the buffer holds without reallocating.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Append an element, growing capacity by 1.5x when full.
    pub fn push(&mut self, value: T) {
        if self.data.len() == self.data.capacity() {
            let grown = ((self.data.capacity() as f64) * Self::GROWTH_FACTOR) as usize;
            let target = grown.max(self.data.len() + 1);
            self.data.reserve_exact(target - self.data.len());
        }
        self.data.push(value);
    }

    /// Ensure capacity for at least `capacity` elements in total.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.data.capacity() {
            self.data.reserve_exact(capacity - self.data.len());
        }
    }

    /// Remove the last element.
    pub fn pop(&mut self) -> Option<T> {
        self.data.pop()
    }

    /// Remove element `idx`, moving the last element into its place.
    pub fn swap_remove(&mut self, idx: usize) -> T {
        self.data.swap_remove(idx)
    }

    /// Shorten to `len` elements.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    /// Drop every element, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Exchange contents (and node tags) with `other`.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Consume into the underlying `Vec`.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Send> NumaVector<T> {
    /// Replace the contents with `len` elements, element `i` being `f(i)`.
    ///
    /// The threads of this vector's node each construct one static chunk.
    pub fn fill_parallel<F>(&mut self, pool: &NumaPool, len: usize, f: F) -> Result<(), NumaError>
    where
        F: Fn(usize) -> T + Sync,
    {
        self.data.clear();
        self.extend_parallel(pool, len, f)
    }

    /// Grow or shrink to `len` elements. New element `i` is `f(i)` and is
    /// constructed in parallel by the node's threads.
    pub fn resize_parallel<F>(&mut self, pool: &NumaPool, len: usize, f: F) -> Result<(), NumaError>
    where
        F: Fn(usize) -> T + Sync,
    {
        let old = self.data.len();
        if len <= old {
            self.data.truncate(len);
            return Ok(());
        }
        self.extend_parallel(pool, len - old, |k| f(old + k))
    }

    fn extend_parallel<F>(&mut self, pool: &NumaPool, additional: usize, f: F) -> Result<(), NumaError>
    where
        F: Fn(usize) -> T + Sync,
    {
        let mut targets = [FillTarget {
            numa_node: self.numa_node,
            data: &mut self.data,
            additional,
        }];
        raw::extend_all_parallel(pool, &mut targets, |_, range, emit| {
            for k in range {
                emit(f(k));
            }
        })
    }

    /// Replace the contents of several vectors in one parallel phase.
    ///
    /// `lens[i]` is the new length of `vectors[i]`.
    /// `produce(i, range, emit)` must emit the elements at positions
    /// `range` of vector `i`, in order; it runs on a thread of vector
    /// `i`'s node. Chunk-wise production lets callers amortise lookups
    /// over a whole range.
    pub fn fill_all_parallel<P>(
        pool: &NumaPool,
        vectors: &mut [NumaVector<T>],
        lens: &[usize],
        produce: P,
    ) -> Result<(), NumaError>
    where
        P: Fn(usize, Range<usize>, &mut dyn FnMut(T)) + Sync,
    {
        let mut targets: Vec<FillTarget<'_, T>> = vectors
            .iter_mut()
            .zip(lens)
            .map(|(v, &len)| {
                v.data.clear();
                FillTarget {
                    numa_node: v.numa_node,
                    data: &mut v.data,
                    additional: len,
                }
            })
            .collect();
        raw::extend_all_parallel(pool, &mut targets, produce)
    }
}

impl<T: Clone + Send + Sync> NumaVector<T> {
    /// Copy into fresh storage on `numa_node`, written by that node's
    /// threads.
    pub fn clone_parallel(&self, pool: &NumaPool, numa_node: NumaNodeId) -> Result<Self, NumaError> {
        let mut out = Self::with_capacity(numa_node, self.data.len());
        out.extend_parallel(pool, self.data.len(), |i| self.data[i].clone())?;
        Ok(out)
    }
}

impl<T> Deref for NumaVector<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for NumaVector<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}
