//! Publishing storage initialised by several threads at once.
//!
//! Contains the crate's only `unsafe` block, with a `SAFETY:` comment.

#![allow(unsafe_code)]

use std::mem::MaybeUninit;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use mote_core::NumaNodeId;

use crate::error::NumaError;
use crate::pool::NumaPool;
use crate::thread_info::static_chunk_range;

/// One vector to extend: its buffer, owning node and element count.
pub(crate) struct FillTarget<'a, T> {
    pub(crate) data: &'a mut Vec<T>,
    pub(crate) numa_node: NumaNodeId,
    pub(crate) additional: usize,
}

type Slot<'a, T> = Mutex<Option<(Range<usize>, &'a mut [MaybeUninit<T>])>>;

/// Append `additional` elements to every target in one parallel phase.
///
/// Each target's new slots are split into static chunks, one per thread
/// of the target's node, so the first touch of each page comes from the
/// node that owns it. If a node is not part of the pool's topology every
/// pool thread takes a chunk of that target.
///
/// `produce(target, range, emit)` must call `emit` once per element of
/// `range` (offsets from the target's first new slot), in order. Extra
/// values are dropped; missing ones make the fill fail with
/// [`NumaError::IncompleteFill`] and leave every target at its old length.
/// A panic in `produce` propagates after all threads finish, also leaving
/// lengths untouched. Elements already written in either case are leaked.
pub(crate) fn extend_all_parallel<T, P>(
    pool: &NumaPool,
    targets: &mut [FillTarget<'_, T>],
    produce: P,
) -> Result<(), NumaError>
where
    T: Send,
    P: Fn(usize, Range<usize>, &mut dyn FnMut(T)) + Sync,
{
    let info = pool.thread_info();
    let written: Vec<AtomicUsize> = targets.iter().map(|_| AtomicUsize::new(0)).collect();
    let bases: Vec<usize> = targets.iter().map(|t| t.data.len()).collect();
    for t in targets.iter_mut() {
        t.data.reserve(t.additional);
    }

    {
        // slots[target][part]
        let mut layout = Vec::with_capacity(targets.len());
        let mut slots: Vec<Vec<Slot<'_, T>>> = Vec::with_capacity(targets.len());
        for t in targets.iter_mut() {
            let on_node = t.numa_node.index() < info.numa_nodes();
            let parts = if on_node {
                info.threads_in_numa_node(t.numa_node)
            } else {
                info.max_threads()
            };
            let mut spare = &mut t.data.spare_capacity_mut()[..t.additional];
            let mut per_part = Vec::with_capacity(parts);
            for part in 0..parts {
                let range = static_chunk_range(t.additional, parts, part);
                let (head, tail) = std::mem::take(&mut spare).split_at_mut(range.len());
                spare = tail;
                per_part.push(Mutex::new(Some((range, head))));
            }
            layout.push((t.numa_node, on_node));
            slots.push(per_part);
        }

        pool.broadcast(|tid| {
            for (target, &(node, on_node)) in layout.iter().enumerate() {
                let part = if on_node {
                    if info.numa_node(tid) != node {
                        continue;
                    }
                    info.numa_thread_id(tid)
                } else {
                    tid
                };
                let Some(slot) = slots[target].get(part) else {
                    continue;
                };
                let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                let Some((range, out)) = taken else {
                    continue;
                };
                if range.is_empty() {
                    continue;
                }
                let mut filled = 0usize;
                produce(target, range, &mut |value: T| {
                    if let Some(cell) = out.get_mut(filled) {
                        cell.write(value);
                        filled += 1;
                    }
                });
                written[target].fetch_add(filled, Ordering::Release);
            }
        });
    }

    for (t, w) in targets.iter().zip(&written) {
        let w = w.load(Ordering::Acquire);
        if w != t.additional {
            return Err(NumaError::IncompleteFill {
                expected: t.additional,
                written: w,
            });
        }
    }
    for (t, base) in targets.iter_mut().zip(bases) {
        // SAFETY: the target's spare slots `..additional` were split into
        // disjoint chunks covering all of them. Each chunk was taken from
        // its mutex by exactly one thread, which wrote its slots in order
        // and added the number written to `written`. Every target's count
        // equals `additional` (checked above), so slots
        // `base..base + additional` are initialised, and `reserve` above
        // guarantees the capacity.
        unsafe {
            t.data.set_len(base + t.additional);
        }
    }
    Ok(())
}
