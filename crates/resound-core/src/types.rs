//! Spatial types

use serde::{Deserialize, Serialize};

/// A point or direction in world space
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// Default facing of emitters and the listener
    pub const FORWARD: Self = Self::new(0.0, 0.0, -1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn from_array([x, y, z]: [f32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

/// Placement pushed to a playing instance or the listener
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attributes3D {
    pub position: Vec3,
    pub forward: Vec3,
}

impl Default for Attributes3D {
    fn default() -> Self {
        Self::from_position(Vec3::ZERO)
    }
}

impl Attributes3D {
    /// Attributes at `position` facing down -Z
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            forward: Vec3::FORWARD,
        }
    }
}
