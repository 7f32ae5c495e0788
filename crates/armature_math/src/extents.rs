use serde::Serialize;

use crate::Vec3;

/// Axis-aligned extents accumulated from a set of points.
///
/// A freshly reset `Extents` is inverted (minimum at +inf, maximum at -inf)
/// so that the first added point becomes both corners.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Extents {
    pub minimum: Vec3,
    pub maximum: Vec3,
}

impl Default for Extents {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Extents {
    /// Extents that contain nothing.
    pub const EMPTY: Extents = Extents {
        minimum: Vec3::splat(f32::INFINITY),
        maximum: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Reset to the empty state.
    pub fn reset(&mut self) {
        *self = Self::EMPTY;
    }

    /// True until a point has been added.
    pub fn is_empty(&self) -> bool {
        self.minimum.x > self.maximum.x
            || self.minimum.y > self.maximum.y
            || self.minimum.z > self.maximum.z
    }

    /// Grow to include `point`.
    pub fn add_point(&mut self, point: Vec3) {
        self.minimum = self.minimum.min(point);
        self.maximum = self.maximum.max(point);
    }

    /// Grow to include another set of extents.
    pub fn add_extents(&mut self, other: &Extents) {
        if other.is_empty() {
            return;
        }
        self.add_point(other.minimum);
        self.add_point(other.maximum);
    }
}
