//! Boundary behavior of the simulation domain.

use mote_core::Real3;

/// What happens to agents that leave `[min_bound, max_bound]`.
///
/// # Examples
///
/// ```
/// use mote_space::BoundSpaceMode;
///
/// assert_eq!(BoundSpaceMode::Closed.apply([-5.0, 50.0, 120.0], 0.0, 100.0), [0.0, 50.0, 100.0]);
/// assert_eq!(BoundSpaceMode::Torus.apply([-5.0, 50.0, 120.0], 0.0, 100.0), [95.0, 50.0, 20.0]);
/// assert_eq!(BoundSpaceMode::Open.apply([-5.0, 50.0, 120.0], 0.0, 100.0), [-5.0, 50.0, 120.0]);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BoundSpaceMode {
    /// No boundary. The grid grows with the population.
    #[default]
    Open,
    /// Positions are clamped into the domain.
    Closed,
    /// Positions wrap around (periodic domain).
    Torus,
}

impl BoundSpaceMode {
    /// `true` for `Closed` and `Torus`.
    pub fn is_bounded(self) -> bool {
        !matches!(self, Self::Open)
    }

    /// Map `position` back into `[min, max]` according to the mode.
    pub fn apply(self, position: Real3, min: f64, max: f64) -> Real3 {
        match self {
            Self::Open => position,
            Self::Closed => position.map(|c| c.clamp(min, max)),
            Self::Torus => {
                let extent = max - min;
                position.map(|c| {
                    if (min..max).contains(&c) {
                        c
                    } else {
                        min + (c - min).rem_euclid(extent)
                    }
                })
            }
        }
    }
}
