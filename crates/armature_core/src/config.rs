//! Typed view over the mapping file, plus caller options for a read.

use std::collections::HashMap;

use armature_math::{quat_from_euler_degrees, Mat4, Quat, Vec3};

use crate::fbx::process_id;
use crate::mapping::{Mapping, MappingValue};

/// What to do when a cluster, mesh or attachment names a model that is not
/// in the joint list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Bind to joint 0, record the reference and keep going.
    #[default]
    Fallback,
    /// Abort the read with [`LoadError::Unresolved`](crate::fbx::LoadError::Unresolved).
    Strict,
}

/// Options chosen by the caller rather than the asset.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    pub unresolved: UnresolvedPolicy,
}

impl ReadOptions {
    pub fn strict() -> Self {
        Self {
            unresolved: UnresolvedPolicy::Strict,
        }
    }
}

/// Model names of the joints the runtime looks up by role.
#[derive(Clone, Debug, PartialEq)]
pub struct JointNames {
    pub eye_left: String,
    pub eye_right: String,
    pub neck: String,
    pub root: String,
    pub lean: String,
    pub head: String,
    pub left_hand: String,
    pub right_hand: String,
}

/// An attachment as written in the mapping file, before joint resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentSpec {
    pub joint: String,
    pub url: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

/// Everything the assembler reads from the mapping file.
#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub joint_names: JointNames,
    pub left_fingers: Vec<String>,
    pub right_fingers: Vec<String>,
    pub left_fingertips: Vec<String>,
    pub right_fingertips: Vec<String>,

    /// Canonical blendshape name -> `(source channel, weight)` overrides
    pub blendshape_overrides: HashMap<String, Vec<(String, f32)>>,

    /// Names of models flagged as free-moving
    pub free_joints: Vec<String>,

    /// Springiness per model name
    pub springs: HashMap<String, f32>,
    pub default_spring: f32,

    /// Global offset: translate * rotate * scale
    pub offset: Mat4,

    pub palm_direction: Vec3,
    pub attachments: Vec<AttachmentSpec>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_mapping(&Mapping::new())
    }
}

impl ImportConfig {
    pub fn from_mapping(mapping: &Mapping) -> Self {
        let empty = Mapping::new();
        let joints = mapping.section("joint").unwrap_or(&empty);
        let joint_name = |key: &str| process_id(joints.text(key).unwrap_or(key)).to_string();

        let joint_names = JointNames {
            eye_left: joint_name("jointEyeLeft"),
            eye_right: joint_name("jointEyeRight"),
            neck: joint_name("jointNeck"),
            root: joint_name("jointRoot"),
            lean: joint_name("jointLean"),
            head: joint_name("jointHead"),
            left_hand: joint_name("jointLeftHand"),
            right_hand: joint_name("jointRightHand"),
        };

        let mut blendshape_overrides: HashMap<String, Vec<(String, f32)>> = HashMap::new();
        if let Some(bs) = mapping.section("bs") {
            for (canonical, value) in bs.iter() {
                let parts = value.as_list();
                let Some(source) = parts.first() else {
                    continue;
                };
                let weight = parts
                    .get(1)
                    .and_then(|w| w.trim().parse().ok())
                    .unwrap_or(1.0);
                blendshape_overrides
                    .entry(canonical.to_string())
                    .or_default()
                    .push((source.to_string(), weight));
            }
        }

        let free_joints = mapping
            .get_all("freeJoint")
            .iter()
            .filter_map(MappingValue::as_text)
            .map(str::to_string)
            .collect();

        let mut springs = HashMap::new();
        let mut default_spring = 0.0;
        if let Some(section) = mapping.section("spring") {
            for (name, value) in section.iter() {
                let Some(spring) = value.as_text().and_then(|v| v.trim().parse::<f32>().ok()) else {
                    continue;
                };
                if name == "default" {
                    default_spring = spring;
                } else {
                    springs.insert(name.to_string(), spring);
                }
            }
        }

        let scale = mapping.float("scale").unwrap_or(1.0);
        let rotation = quat_from_euler_degrees(Vec3::new(
            mapping.float("rx").unwrap_or(0.0),
            mapping.float("ry").unwrap_or(0.0),
            mapping.float("rz").unwrap_or(0.0),
        ));
        let translation = Vec3::new(
            mapping.float("tx").unwrap_or(0.0),
            mapping.float("ty").unwrap_or(0.0),
            mapping.float("tz").unwrap_or(0.0),
        );
        let offset = Mat4::from_scale_rotation_translation(Vec3::splat(scale), rotation, translation);

        let palm_direction = parse_vec3(mapping.text("palmDirection").unwrap_or("0, -1, 0"));

        let attachments = mapping
            .section("attach")
            .map(|section| section.iter().map(|(joint, value)| attachment_spec(joint, value)).collect())
            .unwrap_or_default();

        Self {
            joint_names,
            left_fingers: joint_list(joints, "jointLeftFingers"),
            right_fingers: joint_list(joints, "jointRightFingers"),
            left_fingertips: joint_list(joints, "jointLeftFingertips"),
            right_fingertips: joint_list(joints, "jointRightFingertips"),
            blendshape_overrides,
            free_joints,
            springs,
            default_spring,
            offset,
            palm_direction,
            attachments,
        }
    }

    pub fn is_free(&self, model_name: &str) -> bool {
        self.free_joints.iter().any(|name| name == model_name)
    }

    /// Springiness of the mesh owned by `model_name`.
    pub fn springiness(&self, model_name: &str) -> f32 {
        self.springs.get(model_name).copied().unwrap_or(self.default_spring)
    }
}

fn joint_list(joints: &Mapping, key: &str) -> Vec<String> {
    joints
        .get_all(key)
        .iter()
        .flat_map(MappingValue::as_list)
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| process_id(name).to_string())
        .collect()
}

fn attachment_spec(joint: &str, value: &MappingValue) -> AttachmentSpec {
    let parts = value.as_list();
    let mut spec = AttachmentSpec {
        joint: process_id(joint).to_string(),
        url: parts.first().map(|url| url.to_string()).unwrap_or_default(),
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };
    if let Some(translation) = parts.get(1) {
        spec.translation = parse_vec3(translation);
    }
    if let Some(rotation) = parts.get(2) {
        spec.rotation = quat_from_euler_degrees(parse_vec3(rotation));
    }
    if let Some(scale) = parts.get(3) {
        spec.scale = parse_vec3(scale);
    }
    spec
}

/// Parse `"x, y, z"`. Missing components repeat the last one given;
/// unparseable components read as zero.
pub fn parse_vec3(text: &str) -> Vec3 {
    let elements: Vec<f32> = text
        .split(',')
        .map(|element| element.trim().parse().unwrap_or(0.0))
        .collect();
    let component = |i: usize| {
        elements
            .get(i.min(elements.len().saturating_sub(1)))
            .copied()
            .unwrap_or(0.0)
    };
    Vec3::new(component(0), component(1), component(2))
}
