//! Uniform spatial grid for the Mote simulation engine.
//!
//! The [`UniformGrid`] partitions space into cubic boxes whose edge is at
//! least the largest agent diameter, so every interaction partner of an
//! agent lies in the 3x3x3 block of boxes around it. Box membership is
//! rebuilt from scratch on every [`update`](UniformGrid::update) with a
//! counting sort: histogram, exclusive prefix sum, scatter.
//!
//! The grid also provides a Morton (Z) order over its boxes ([`ZOrder`]),
//! which the resource manager consumes to lay agents out in memory so
//! that spatial neighbors are memory neighbors.
//!
//! # Bound space
//!
//! - [`BoundSpaceMode::Open`]: the grid follows the agents wherever they go.
//! - [`BoundSpaceMode::Closed`]: agents are clamped into `[min, max]`.
//! - [`BoundSpaceMode::Torus`]: agents leaving one side re-enter on the other.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bound;
pub mod error;
pub mod grid;
pub mod morton;

pub use bound::BoundSpaceMode;
pub use error::GridError;
pub use grid::{GridConfig, UniformGrid};
pub use morton::{morton_code, ZOrder};
