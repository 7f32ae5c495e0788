//! Collision primitives fitted to the vertices each joint drives.
//!
//! Vertices are gathered per joint while meshes are bound, then every joint
//! gets either a capsule along its bone or a sphere around its vertices.

use armature_math::{rotation_between, Mat4, Mat4Ext, Quat, Vec3, EPSILON};

use crate::scene::{Joint, ShapeType};

/// Minimum skin weight for a vertex to count towards a joint's shape on
/// multi-cluster meshes.
pub const EXPANSION_WEIGHT_THRESHOLD: f32 = 0.25;

/// Bone geometry of one joint, expressed in a mesh's space.
#[derive(Clone, Copy, Debug)]
pub struct BoneFrame {
    bone_end: Vec3,
    direction: Vec3,
    length: f32,
    radius_scale: f32,
    rotate_mesh_to_joint: Quat,
}

impl BoneFrame {
    /// Frame of `joints[joint_index]` for a mesh placed at `model_transform`
    /// and bound through `inverse_bind_matrix`.
    pub fn new(joints: &[Joint], joint_index: usize, model_transform: Mat4, inverse_bind_matrix: Mat4) -> Self {
        let joint = &joints[joint_index];
        let inverse_model = model_transform.inverse();
        let joint_to_mesh = inverse_model * joint.bind_transform;
        let bone_end = joint_to_mesh.extract_translation();

        let mut direction = Vec3::ZERO;
        let mut length = 0.0;
        if let Some(parent) = joint.parent_index.and_then(|index| joints.get(index)) {
            let bone_begin = (inverse_model * parent.bind_transform).extract_translation();
            let bone = bone_end - bone_begin;
            length = bone.length();
            if length > EPSILON {
                direction = bone / length;
            }
        }

        Self {
            bone_end,
            direction,
            length,
            radius_scale: (joint.transform * inverse_bind_matrix).extract_uniform_scale(),
            rotate_mesh_to_joint: joint_to_mesh.extract_rotation().inverse(),
        }
    }
}

/// Per-joint accumulator.
#[derive(Clone, Debug, Default)]
pub struct JointShapeInfo {
    /// Vertices whose projection fell strictly inside the bone
    pub num_projected: usize,
    pub max_radius: f32,

    /// Contributing vertices in the joint frame, scaled
    pub points: Vec<Vec3>,
}

impl JointShapeInfo {
    pub fn accumulate(&mut self, frame: &BoneFrame, vertex: Vec3) {
        let projection = frame.direction.dot(frame.bone_end - vertex);
        if projection > 0.0 && projection < frame.length {
            self.num_projected += 1;
            let on_bone = frame.bone_end - frame.direction * projection;
            self.max_radius = self.max_radius.max(frame.radius_scale * vertex.distance(on_bone));
        }
        self.points
            .push(frame.rotate_mesh_to_joint * (frame.radius_scale * (vertex - frame.bone_end)));
    }

    fn centroid(&self) -> Vec3 {
        if self.points.is_empty() {
            return Vec3::ZERO;
        }
        self.points.iter().copied().sum::<Vec3>() / self.points.len() as f32
    }
}

/// Pick and place a shape for every joint from its accumulated vertices.
pub fn fit_joint_shapes(joints: &mut [Joint], infos: &[JointShapeInfo]) {
    let empty = JointShapeInfo::default();
    for index in 0..joints.len() {
        let info = infos.get(index).unwrap_or(&empty);

        let bone_begin = match joints[index].parent_index.and_then(|parent| joints.get(parent)) {
            Some(parent) => {
                let joint = &joints[index];
                joint.transform.extract_rotation().inverse()
                    * (parent.transform.extract_translation() - joint.transform.extract_translation())
            }
            None => Vec3::ZERO,
        };

        let joint = &mut joints[index];
        joint.bone_radius = info.max_radius;

        if info.num_projected > 0 && bone_begin.length() > EPSILON {
            joint.shape_type = ShapeType::Capsule;
            joint.shape_rotation = rotation_between(Vec3::Y, bone_begin);
            joint.shape_position = 0.5 * bone_begin;
        } else {
            let centroid = info.centroid();
            joint.shape_type = ShapeType::Sphere;
            joint.shape_position = centroid;
            if info.num_projected == 0 && !info.points.is_empty() {
                let total: f32 = info.points.iter().map(|point| point.distance(centroid)).sum();
                joint.bone_radius = total / info.points.len() as f32;
            }
        }
    }
}
