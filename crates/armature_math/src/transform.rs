// Transform utilities for Mat4
//
// Extends glam::Mat4 with the decompositions the skinning and collision
// fitting code relies on.

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::EPSILON;

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// The translation column of the matrix.
    fn extract_translation(&self) -> Vec3;

    /// The rotation of the matrix with scale removed from its basis.
    fn extract_rotation(&self) -> Quat;

    /// Per-axis scale (lengths of the basis columns).
    fn extract_scale(&self) -> Vec3;

    /// Mean of the per-axis scale factors.
    fn extract_uniform_scale(&self) -> f32;
}

impl Mat4Ext for Mat4 {
    fn extract_translation(&self) -> Vec3 {
        self.w_axis.truncate()
    }

    fn extract_rotation(&self) -> Quat {
        let x = self.x_axis.truncate().normalize_or_zero();
        let y = self.y_axis.truncate().normalize_or_zero();
        let z = self.z_axis.truncate().normalize_or_zero();
        if x == Vec3::ZERO || y == Vec3::ZERO || z == Vec3::ZERO {
            return Quat::IDENTITY;
        }
        Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize()
    }

    fn extract_scale(&self) -> Vec3 {
        Vec3::new(
            self.x_axis.truncate().length(),
            self.y_axis.truncate().length(),
            self.z_axis.truncate().length(),
        )
    }

    fn extract_uniform_scale(&self) -> f32 {
        let scale = self.extract_scale();
        (scale.x + scale.y + scale.z) / 3.0
    }
}

/// Build a rotation from Euler angles in degrees, applied X first, then Y, then Z.
pub fn quat_from_euler_degrees(degrees: Vec3) -> Quat {
    let radians = Vec3::new(
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    );
    Quat::from_rotation_z(radians.z) * Quat::from_rotation_y(radians.y) * Quat::from_rotation_x(radians.x)
}

/// Shortest rotation taking direction `from` onto direction `to`.
///
/// Returns identity when either vector is (nearly) zero length.
pub fn rotation_between(from: Vec3, to: Vec3) -> Quat {
    if from.length() < EPSILON || to.length() < EPSILON {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from.normalize(), to.normalize())
}
