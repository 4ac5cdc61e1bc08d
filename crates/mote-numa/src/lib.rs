//! NUMA topology and fork-join execution for the Mote simulation engine.
//!
//! [`ThreadInfo`] maps every pool thread to a NUMA node and a dense index
//! within that node. [`NumaPool`] is the fork-join executor: a rayon pool
//! whose [`broadcast`](NumaPool::broadcast) runs a closure exactly once on
//! every worker, returning only when all of them are done. Each broadcast
//! is one parallel phase followed by a barrier.
//!
//! [`NumaVector`] is the per-node container the resource manager stores
//! agents in. Its parallel fill lets each node's own threads write that
//! node's slots, so first-touch page placement puts the memory on the
//! right node.
//!
//! Thread pinning is delegated to a [`Topology`] implementation; the
//! provided ones describe synthetic layouts and do not pin.
//!
//! This crate denies `unsafe_code` except in the private `raw` module,
//! which holds the single primitive that publishes slots written in
//! parallel.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod error;
pub mod numa_vector;
pub mod pool;
mod raw;
pub mod thread_info;
pub mod topology;

pub use error::NumaError;
pub use numa_vector::NumaVector;
pub use pool::NumaPool;
pub use thread_info::{static_chunk_range, ThreadInfo};
pub use topology::{BlockTopology, ExplicitTopology, SingleNode, Topology};
