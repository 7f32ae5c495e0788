// Re-export glam for convenience
pub use glam::*;

// Armature math types
mod extents;
pub use extents::Extents;

mod transform;
pub use transform::{quat_from_euler_degrees, rotation_between, Mat4Ext};

/// Tolerance used for degenerate-length checks throughout the importer.
pub const EPSILON: f32 = 1.0e-4;
