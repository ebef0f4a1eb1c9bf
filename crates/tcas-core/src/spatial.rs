//! Spatial math for flight paths and closest-approach queries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Coordinate equality tolerance, in world units.
pub const EPSILON: f64 = 0.1;

/// A point in simulation space. `z` doubles as altitude.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    pub const ORIGIN: Coordinate = Coordinate {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean 3-D distance to another point.
    pub fn distance(self, other: Coordinate) -> f64 {
        let d = self - other;
        d.dot(d).sqrt()
    }

    /// Two coordinates are considered the same location when their
    /// distance falls below [`EPSILON`].
    pub fn approx_eq(self, other: Coordinate) -> bool {
        self.distance(other) < EPSILON
    }

    /// Linear interpolation between `self` (t = 0) and `other` (t = 1).
    pub fn lerp(self, other: Coordinate, t: f64) -> Coordinate {
        self + (other - self) * t
    }

    fn dot(self, other: Coordinate) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

impl Add for Coordinate {
    type Output = Coordinate;

    fn add(self, rhs: Coordinate) -> Coordinate {
        Coordinate::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Coordinate {
    type Output = Coordinate;

    fn sub(self, rhs: Coordinate) -> Coordinate {
        Coordinate::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Coordinate {
    type Output = Coordinate;

    fn mul(self, rhs: f64) -> Coordinate {
        Coordinate::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.0}, {:.0}, {:.0})", self.x, self.y, self.z)
    }
}

/// Closest pair of points between two line segments.
///
/// Each segment is an ordered `(departure, destination)` pair treated as
/// the straight path `p(t) = departure + t * (destination - departure)`
/// with `t` clamped to `[0, 1]`. The parameters are found by setting the
/// gradient of the squared distance to zero and clamping, re-projecting
/// once so both points stay on their segments.
///
/// Tie-breaks: parallel segments resolve to the midpoint of their
/// parameter overlap; a zero-length segment stands in for its endpoint.
pub fn closest_approach(
    seg1: (Coordinate, Coordinate),
    seg2: (Coordinate, Coordinate),
) -> (Coordinate, Coordinate) {
    let (p1, q1) = seg1;
    let (p2, q2) = seg2;

    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;

    let a = d1.dot(d1);
    let e = d2.dot(d2);
    let f = d2.dot(r);

    let degenerate1 = a <= EPSILON * EPSILON;
    let degenerate2 = e <= EPSILON * EPSILON;

    if degenerate1 && degenerate2 {
        return (p1, p2);
    }
    if degenerate1 {
        // Segment 1 is a point; project it onto segment 2.
        let t = (f / e).clamp(0.0, 1.0);
        return (p1, p2.lerp(q2, t));
    }

    let c = d1.dot(r);
    if degenerate2 {
        let s = (-c / a).clamp(0.0, 1.0);
        return (p1.lerp(q1, s), p2);
    }

    let b = d1.dot(d2);
    let denom = a * e - b * b;

    let s = if denom.abs() > f64::EPSILON * a * e {
        ((b * f - c * e) / denom).clamp(0.0, 1.0)
    } else {
        // Parallel segments: take the midpoint of the parameter overlap
        // of segment 2 projected onto segment 1, if any.
        let t_start = (-c / a).clamp(0.0, 1.0);
        let t_end = ((b - c) / a).clamp(0.0, 1.0);
        (t_start + t_end) / 2.0
    };

    // Point on segment 1 for parameter s, then the closest parameter on
    // segment 2, re-clamped against each other.
    let t = ((b * s + f) / e).clamp(0.0, 1.0);
    let s = ((b * t - c) / a).clamp(0.0, 1.0);

    (p1.lerp(q1, s), p2.lerp(q2, t))
}
