//! Error types for grid construction.

use std::error::Error;
use std::fmt;

use mote_core::AgentUid;
use mote_resource::ResourceError;

/// Errors arising from [`UniformGrid::update`](crate::UniformGrid::update).
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// No agents and no fixed bounds: the domain size is unknown.
    EmptyUnbounded,
    /// An agent's position has a NaN or infinite component.
    NonFinitePosition {
        /// The offending agent.
        uid: AgentUid,
    },
    /// The largest diameter (or configured box length) is not positive.
    InvalidBoxLength {
        /// The rejected length.
        length: f64,
    },
    /// The grid would need more boxes than can be indexed.
    TooManyBoxes {
        /// Boxes per axis.
        boxes_per_axis: [u64; 3],
    },
    /// Agent storage reported an error while the grid was assigning boxes.
    Resource(ResourceError),
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyUnbounded => write!(
                f,
                "cannot size an empty simulation without bound space; add agents or bound the space"
            ),
            Self::NonFinitePosition { uid } => write!(f, "agent {uid} has a non-finite position"),
            Self::InvalidBoxLength { length } => {
                write!(f, "box length must be positive, got {length}")
            }
            Self::TooManyBoxes { boxes_per_axis } => {
                write!(f, "grid of {boxes_per_axis:?} boxes exceeds the index range")
            }
            Self::Resource(e) => write!(f, "resource: {e}"),
        }
    }
}

impl Error for GridError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Resource(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ResourceError> for GridError {
    fn from(e: ResourceError) -> Self {
        Self::Resource(e)
    }
}
