//! The assembled result of an import.
//!
//! A [`Geometry`] owns the joint hierarchy and the meshes skinned to it. It is
//! built once by the loader and handed to the caller as a value; nothing in
//! here refers back to the parsed document.

use armature_math::{Extents, Mat4, Mat4Ext, Quat, Vec3};
use indexmap::IndexMap;
use serde::Serialize;

use crate::fbx::UnresolvedReference;
use crate::mesh::Mesh;

/// Kind of collision primitive fitted to a joint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ShapeType {
    Capsule,
    Sphere,
    #[default]
    Unknown,
}

/// One node of the skeleton.
///
/// Joints are stored parents-first, so `parent_index` is always smaller than
/// the joint's own index.
#[derive(Clone, Debug, Serialize)]
pub struct Joint {
    /// Model name from the source document
    pub name: String,

    pub parent_index: Option<usize>,

    /// Flagged free-moving by the mapping file
    pub is_free: bool,

    /// This joint followed by its ancestors, up to and including the nearest
    /// free one (empty when neither the joint nor an ancestor is free)
    pub free_lineage: Vec<usize>,

    pub translation: Vec3,
    pub pre_transform: Mat4,
    pub pre_rotation: Quat,
    pub rotation: Quat,
    pub post_rotation: Quat,
    pub post_transform: Mat4,

    /// Rotation limits in radians
    pub rotation_min: Vec3,
    pub rotation_max: Vec3,

    /// Global default-pose transform (scene offset included)
    pub transform: Mat4,

    pub inverse_default_rotation: Quat,

    /// Defaults to `inverse_default_rotation`; replaced by a skin cluster
    pub inverse_bind_rotation: Quat,

    /// Global bind transform; replaced by a skin cluster's transform link
    pub bind_transform: Mat4,

    pub distance_to_parent: f32,
    pub bone_radius: f32,

    pub shape_type: ShapeType,
    /// Shape centre in the joint frame
    pub shape_position: Vec3,
    pub shape_rotation: Quat,
}

impl Default for Joint {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent_index: None,
            is_free: false,
            free_lineage: Vec::new(),
            translation: Vec3::ZERO,
            pre_transform: Mat4::IDENTITY,
            pre_rotation: Quat::IDENTITY,
            rotation: Quat::IDENTITY,
            post_rotation: Quat::IDENTITY,
            post_transform: Mat4::IDENTITY,
            rotation_min: Vec3::splat(-std::f32::consts::PI),
            rotation_max: Vec3::splat(std::f32::consts::PI),
            transform: Mat4::IDENTITY,
            inverse_default_rotation: Quat::IDENTITY,
            inverse_bind_rotation: Quat::IDENTITY,
            bind_transform: Mat4::IDENTITY,
            distance_to_parent: 0.0,
            bone_radius: 0.0,
            shape_type: ShapeType::Unknown,
            shape_position: Vec3::ZERO,
            shape_rotation: Quat::IDENTITY,
        }
    }
}

impl Joint {
    /// Global position in the default pose.
    pub fn position(&self) -> Vec3 {
        self.transform.extract_translation()
    }
}

/// A model file attached to a joint (hats, glasses, ...).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Attachment {
    /// `None` when the named joint does not exist and the read was lenient
    pub joint_index: Option<usize>,
    pub url: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// Everything extracted from one model file.
#[derive(Clone, Debug, Serialize)]
pub struct Geometry {
    pub joints: Vec<Joint>,

    /// Joint name -> index, in joint order
    pub joint_indices: IndexMap<String, usize>,

    pub meshes: Vec<Mesh>,

    pub left_eye_joint_index: Option<usize>,
    pub right_eye_joint_index: Option<usize>,
    pub neck_joint_index: Option<usize>,
    pub root_joint_index: Option<usize>,
    pub lean_joint_index: Option<usize>,
    pub head_joint_index: Option<usize>,
    pub left_hand_joint_index: Option<usize>,
    pub right_hand_joint_index: Option<usize>,

    pub left_finger_joint_indices: Vec<usize>,
    pub right_finger_joint_indices: Vec<usize>,
    pub left_fingertip_joint_indices: Vec<usize>,
    pub right_fingertip_joint_indices: Vec<usize>,

    /// Global position of the neck joint (zero without one)
    pub neck_pivot: Vec3,

    /// All mesh vertices under their model transforms
    pub mesh_extents: Extents,

    /// Bind-pose joint positions of every skinned joint
    pub bind_extents: Extents,

    /// Bind-pose positions of skinned joints that cannot move freely
    pub static_extents: Extents,

    pub attachments: Vec<Attachment>,
    pub palm_direction: Vec3,

    /// Scene-wide offset from the mapping file
    pub offset: Mat4,

    /// References that could not be resolved and were bound to joint 0
    pub unresolved: Vec<UnresolvedReference>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            joints: Vec::new(),
            joint_indices: IndexMap::new(),
            meshes: Vec::new(),
            left_eye_joint_index: None,
            right_eye_joint_index: None,
            neck_joint_index: None,
            root_joint_index: None,
            lean_joint_index: None,
            head_joint_index: None,
            left_hand_joint_index: None,
            right_hand_joint_index: None,
            left_finger_joint_indices: Vec::new(),
            right_finger_joint_indices: Vec::new(),
            left_fingertip_joint_indices: Vec::new(),
            right_fingertip_joint_indices: Vec::new(),
            neck_pivot: Vec3::ZERO,
            mesh_extents: Extents::EMPTY,
            bind_extents: Extents::EMPTY,
            static_extents: Extents::EMPTY,
            attachments: Vec::new(),
            palm_direction: Vec3::NEG_Y,
            offset: Mat4::IDENTITY,
            unresolved: Vec::new(),
        }
    }
}

impl Geometry {
    /// Index of the joint with the given name.
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joint_indices.get(name).copied()
    }

    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.joint_index(name).and_then(|index| self.joints.get(index))
    }

    /// True when the joint and all its ancestors are not free.
    pub fn is_static_joint(&self, index: usize) -> bool {
        self.joints
            .get(index)
            .map(|joint| joint.free_lineage.iter().all(|&i| !self.joints[i].is_free))
            .unwrap_or(false)
    }

    /// True when any mesh carries blendshapes.
    pub fn has_blendshapes(&self) -> bool {
        self.meshes.iter().any(|mesh| !mesh.blendshapes.is_empty())
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(Mesh::vertex_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Geometry {
        let mut geometry = Geometry::default();
        for (index, name) in ["Hips", "Spine", "Head"].iter().enumerate() {
            let joint = Joint {
                name: name.to_string(),
                parent_index: index.checked_sub(1),
                free_lineage: (0..=index).rev().collect(),
                ..Default::default()
            };
            geometry.joints.push(joint);
            geometry.joint_indices.insert(name.to_string(), index);
        }
        geometry
    }

    #[test]
    fn test_joint_lookup() {
        let geometry = chain();
        assert_eq!(geometry.joint_index("Spine"), Some(1));
        assert_eq!(geometry.joint("Head").map(|j| j.parent_index), Some(Some(1)));
        assert!(geometry.joint("Tail").is_none());
    }

    #[test]
    fn test_static_joint() {
        let mut geometry = chain();
        assert!(geometry.is_static_joint(2));
        geometry.joints[1].is_free = true;
        assert!(geometry.is_static_joint(0));
        assert!(!geometry.is_static_joint(1));
        assert!(!geometry.is_static_joint(2));
        assert!(!geometry.is_static_joint(7));
    }

    #[test]
    fn test_defaults() {
        let geometry = Geometry::default();
        assert_eq!(geometry.palm_direction, Vec3::NEG_Y);
        assert!(geometry.mesh_extents.is_empty());
        assert_eq!(Joint::default().shape_type, ShapeType::Unknown);
    }
}
