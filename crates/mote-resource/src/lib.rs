//! NUMA-aware agent storage for the Mote simulation engine.
//!
//! The [`ResourceManager`] owns one [`NumaVector`](mote_numa::NumaVector)
//! of agents per NUMA node and a map from permanent [`AgentUid`]s to
//! ephemeral [`AgentHandle`]s. It provides:
//!
//! - parallel iteration with static per-node chunking or dynamic
//!   chunk claiming with cross-node work stealing ([`iter`]),
//! - locality-driven rebalancing that copies agents into fresh per-node
//!   storage in a spatial order supplied by the grid ([`balance`]),
//! - staging of births and removals during parallel phases and their
//!   single-writer commit ([`staging`]),
//! - uid issuance with optional slot reuse governed by utilization
//!   watermarks ([`uid_generator`]).
//!
//! [`AgentUid`]: mote_core::AgentUid
//! [`AgentHandle`]: mote_core::AgentHandle

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod balance;
pub mod error;
pub mod iter;
pub mod manager;
pub mod staging;
pub mod uid_generator;
pub mod uid_map;

pub use balance::LocalityOrder;
pub use error::ResourceError;
pub use iter::{DynamicPlan, IterationStrategy};
pub use manager::{AgentSnapshot, ResourceManager};
pub use staging::{CommitSummary, StagedChanges};
pub use uid_generator::AgentUidGenerator;
pub use uid_map::AgentUidMap;
