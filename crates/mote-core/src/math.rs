//! Minimal 3-D vector arithmetic on [`Real3`].

/// A point or vector in 3-D space.
pub type Real3 = [f64; 3];

/// Component-wise `a + b`.
pub fn add(a: Real3, b: Real3) -> Real3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Component-wise `a - b`.
pub fn sub(a: Real3, b: Real3) -> Real3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// `a * s`.
pub fn scale(a: Real3, s: f64) -> Real3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Dot product.
pub fn dot(a: Real3, b: Real3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Euclidean norm.
pub fn norm(a: Real3) -> f64 {
    dot(a, a).sqrt()
}

/// Squared Euclidean distance between two points.
pub fn squared_distance(a: Real3, b: Real3) -> f64 {
    let d = sub(a, b);
    dot(d, d)
}

/// `true` when every component is finite.
pub fn is_finite(a: Real3) -> bool {
    a.iter().all(|c| c.is_finite())
}
