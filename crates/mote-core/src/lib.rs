//! Core types and traits for the Mote simulation engine.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! identities shared by every other crate ([`AgentUid`], [`AgentHandle`]),
//! the [`Agent`] capability trait with a reference spherical [`Cell`],
//! small 3-D vector helpers, and the prefix-scan and search utilities used
//! by the spatial grid and the resource manager.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod id;
pub mod math;
pub mod scan;
pub mod search;

pub use agent::{Agent, Cell};
pub use id::{AgentHandle, AgentUid, NumaNodeId, StepId};
pub use math::Real3;
pub use scan::{exclusive_prefix_sum, inclusive_prefix_sum, parallel_inclusive_scan};
pub use search::binary_search;
