//! Model records and the joint hierarchy built from them.
//!
//! Models arrive as an unordered set of local transforms plus connection
//! edges. Building the hierarchy:
//!
//! 1. Skinned mesh models are moved under the top-most ancestor of the
//!    joint their first cluster binds to
//! 2. Models are ordered depth-first from each root, so every parent comes
//!    before its children
//! 3. Global transforms, default rotations and free lineages are accumulated
//!    down that order
//!
//! Every walk here is iterative and guarded against cycles.

use std::collections::HashSet;

use armature_math::{quat_from_euler_degrees, Mat4, Mat4Ext, Quat, Vec3};
use indexmap::IndexMap;

use super::connections::ConnectionGraph;
use super::types::{process_id, Node};
use crate::config::ImportConfig;
use crate::scene::{Geometry, Joint};

/// Local transform record of one `Model` object.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub name: String,
    pub translation: Vec3,

    /// `T(rotationOffset) * T(rotationPivot)`
    pub pre_transform: Mat4,
    pub pre_rotation: Quat,
    pub rotation: Quat,
    pub post_rotation: Quat,

    /// `T(-rotationPivot) * T(scalingPivot) * S(scaling) * T(-scalingPivot)`
    pub post_transform: Mat4,

    /// Radians
    pub rotation_min: Vec3,
    pub rotation_max: Vec3,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            name: String::new(),
            translation: Vec3::ZERO,
            pre_transform: Mat4::IDENTITY,
            pre_rotation: Quat::IDENTITY,
            rotation: Quat::IDENTITY,
            post_rotation: Quat::IDENTITY,
            post_transform: Mat4::IDENTITY,
            rotation_min: Vec3::splat(-180.0_f32.to_radians()),
            rotation_max: Vec3::splat(180.0_f32.to_radians()),
        }
    }
}

/// Display name of a model object.
///
/// FBX 7 writes `(id, name, class)`; older files only carry the ID.
pub fn model_name(object: &Node) -> String {
    if object.properties.len() == 3 {
        process_id(&object.object_name(1)).to_string()
    } else {
        object.id(0)
    }
}

impl Model {
    /// Read the transform properties of a `Model` node.
    pub fn read(object: &Node) -> Self {
        let mut translation = Vec3::ZERO;
        let mut rotation_offset = Vec3::ZERO;
        let mut rotation_pivot = Vec3::ZERO;
        let mut pre_rotation = Vec3::ZERO;
        let mut rotation = Vec3::ZERO;
        let mut post_rotation = Vec3::ZERO;
        let mut scaling_pivot = Vec3::ZERO;
        let mut scaling = Vec3::ONE;
        let mut rotation_min = Vec3::ZERO;
        let mut rotation_max = Vec3::ZERO;
        let mut min_enabled = [false; 3];
        let mut max_enabled = [false; 3];

        for (entry, index) in object.object_properties() {
            let enabled = || entry.property(index).is_some_and(|p| p.as_bool());
            match entry.string_at(0).as_ref() {
                "Lcl Translation" => translation = entry.vec3_at(index),
                "RotationOffset" => rotation_offset = entry.vec3_at(index),
                "RotationPivot" => rotation_pivot = entry.vec3_at(index),
                "PreRotation" => pre_rotation = entry.vec3_at(index),
                "Lcl Rotation" => rotation = entry.vec3_at(index),
                "PostRotation" => post_rotation = entry.vec3_at(index),
                "ScalingPivot" => scaling_pivot = entry.vec3_at(index),
                "Lcl Scaling" => scaling = entry.vec3_at(index),
                "RotationMin" => rotation_min = entry.vec3_at(index),
                "RotationMax" => rotation_max = entry.vec3_at(index),
                "RotationMinX" => min_enabled[0] = enabled(),
                "RotationMinY" => min_enabled[1] = enabled(),
                "RotationMinZ" => min_enabled[2] = enabled(),
                "RotationMaxX" => max_enabled[0] = enabled(),
                "RotationMaxY" => max_enabled[1] = enabled(),
                "RotationMaxZ" => max_enabled[2] = enabled(),
                _ => {}
            }
        }

        let limit = |values: Vec3, enabled: [bool; 3], default: f32| {
            Vec3::new(
                if enabled[0] { values.x } else { default },
                if enabled[1] { values.y } else { default },
                if enabled[2] { values.z } else { default },
            ) * std::f32::consts::PI
                / 180.0
        };

        Self {
            name: model_name(object),
            translation,
            pre_transform: Mat4::from_translation(rotation_offset) * Mat4::from_translation(rotation_pivot),
            pre_rotation: quat_from_euler_degrees(pre_rotation),
            rotation: quat_from_euler_degrees(rotation),
            post_rotation: quat_from_euler_degrees(post_rotation),
            post_transform: Mat4::from_translation(-rotation_pivot)
                * Mat4::from_translation(scaling_pivot)
                * Mat4::from_scale(scaling)
                * Mat4::from_translation(-scaling_pivot),
            rotation_min: limit(rotation_min, min_enabled, -180.0),
            rotation_max: limit(rotation_max, max_enabled, 180.0),
        }
    }

    pub fn combined_rotation(&self) -> Quat {
        self.pre_rotation * self.rotation * self.post_rotation
    }

    /// Transform relative to the parent model.
    pub fn local_transform(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * self.pre_transform
            * Mat4::from_quat(self.combined_rotation())
            * self.post_transform
    }
}

/// Most recently recorded parent of `id` that is itself a model.
pub fn model_parent<'a>(graph: &'a ConnectionGraph, models: &IndexMap<String, Model>, id: &str) -> Option<&'a str> {
    graph
        .parents(id)
        .iter()
        .find(|parent| models.contains_key(parent.as_str()))
        .map(String::as_str)
}

/// Walk up model parents from `id` and return the top-most one.
pub fn top_model_id(graph: &ConnectionGraph, models: &IndexMap<String, Model>, id: &str) -> String {
    let mut visited = HashSet::new();
    let mut top = id;
    visited.insert(top);
    while let Some(parent) = model_parent(graph, models, top) {
        if !visited.insert(parent) {
            break;
        }
        top = parent;
    }
    top.to_string()
}

/// Product of local transforms from `id` up through its model ancestors.
pub fn global_transform(graph: &ConnectionGraph, models: &IndexMap<String, Model>, id: &str) -> Mat4 {
    let mut transform = Mat4::IDENTITY;
    let mut visited = HashSet::new();
    let mut current = Some(id);
    while let Some(node) = current {
        if !visited.insert(node) {
            break;
        }
        let Some(model) = models.get(node) else {
            break;
        };
        transform = model.local_transform() * transform;
        current = model_parent(graph, models, node);
    }
    transform
}

/// Move every model that owns a skin cluster under the top-most ancestor of
/// the joint that cluster binds.
pub fn reparent_skinned_models(
    graph: &mut ConnectionGraph,
    models: &IndexMap<String, Model>,
    is_cluster: impl Fn(&str) -> bool,
) {
    for model_id in models.keys() {
        let view: &ConnectionGraph = graph;
        let cluster = view
            .children(model_id)
            .iter()
            .flat_map(|deformer| view.children(deformer))
            .find(|child| is_cluster(child.as_str()));
        let Some(joint_id) = cluster.and_then(|cluster| view.first_child(cluster)) else {
            continue;
        };
        let top = top_model_id(view, models, joint_id);
        if top == *model_id {
            continue;
        }
        log::debug!("Reparenting skinned model {} under {}", model_id, top);
        graph.reparent(model_id, &top);
    }
}

/// A model's place in joint order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderedModel {
    pub id: String,
    pub parent_index: Option<usize>,
}

/// Order models depth-first, parents before children.
///
/// Roots (models without a model parent) are visited in document order and
/// children in connection order. Models caught in a parent cycle are visited
/// last, the first of them in document order acting as a root.
pub fn order_models(graph: &ConnectionGraph, models: &IndexMap<String, Model>) -> Vec<OrderedModel> {
    let mut order: Vec<OrderedModel> = Vec::with_capacity(models.len());
    let mut visited: HashSet<&str> = HashSet::new();

    let roots: Vec<&str> = models
        .keys()
        .map(String::as_str)
        .filter(|id| model_parent(graph, models, id).is_none())
        .collect();
    let stragglers = models.keys().map(String::as_str);

    for root in roots.into_iter().chain(stragglers) {
        if visited.contains(root) {
            continue;
        }
        let mut stack: Vec<(&str, Option<usize>)> = vec![(root, None)];
        while let Some((id, parent_index)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let index = order.len();
            order.push(OrderedModel {
                id: id.to_string(),
                parent_index,
            });
            for child in graph.children(id).iter().rev() {
                let child = child.as_str();
                if models.contains_key(child)
                    && !visited.contains(child)
                    && model_parent(graph, models, child) == Some(id)
                {
                    stack.push((child, Some(index)));
                }
            }
        }
    }
    order
}

/// Turn ordered models into joints with global default-pose transforms.
pub fn build_joints(
    models: &IndexMap<String, Model>,
    order: &[OrderedModel],
    config: &ImportConfig,
    offset: Mat4,
) -> Vec<Joint> {
    let mut joints: Vec<Joint> = Vec::with_capacity(order.len());
    for entry in order {
        let model = models.get(&entry.id).cloned().unwrap_or_default();
        let index = joints.len();
        let is_free = config.is_free(&model.name);

        let mut free_lineage = vec![index];
        if !is_free {
            let mut found_free = false;
            let mut ancestor = entry.parent_index;
            while let Some(ancestor_index) = ancestor {
                free_lineage.push(ancestor_index);
                if joints[ancestor_index].is_free {
                    found_free = true;
                    break;
                }
                ancestor = joints[ancestor_index].parent_index;
            }
            if !found_free {
                free_lineage.clear();
            }
        }

        let combined = model.combined_rotation();
        let (parent_transform, parent_inverse_rotation) = match entry.parent_index {
            Some(parent) => (joints[parent].transform, joints[parent].inverse_default_rotation),
            None => (offset, Quat::IDENTITY),
        };
        let transform = parent_transform * model.local_transform();
        let inverse_default_rotation = combined.inverse() * parent_inverse_rotation;
        let distance_to_parent = match entry.parent_index {
            Some(parent) => joints[parent].position().distance(transform.extract_translation()),
            None => 0.0,
        };

        joints.push(Joint {
            name: model.name,
            parent_index: entry.parent_index,
            is_free,
            free_lineage,
            translation: model.translation,
            pre_transform: model.pre_transform,
            pre_rotation: model.pre_rotation,
            rotation: model.rotation,
            post_rotation: model.post_rotation,
            post_transform: model.post_transform,
            rotation_min: model.rotation_min,
            rotation_max: model.rotation_max,
            transform,
            distance_to_parent,
            inverse_default_rotation,
            inverse_bind_rotation: inverse_default_rotation,
            bind_transform: transform,
            ..Default::default()
        });
    }
    joints
}

/// Fill in the role-specific joint indices and the neck pivot.
pub fn assign_special_joints(geometry: &mut Geometry, config: &ImportConfig) {
    let names = &config.joint_names;
    for (index, joint) in geometry.joints.iter().enumerate() {
        let name = joint.name.as_str();
        let slot = if name == names.eye_left || name == "EyeL" || name == "joint_Leye" {
            &mut geometry.left_eye_joint_index
        } else if name == names.eye_right || name == "EyeR" || name == "joint_Reye" {
            &mut geometry.right_eye_joint_index
        } else if name == names.neck || name == "NeckRot" || name == "joint_neck" {
            &mut geometry.neck_joint_index
        } else if name == names.root {
            &mut geometry.root_joint_index
        } else if name == names.lean {
            &mut geometry.lean_joint_index
        } else if name == names.head {
            &mut geometry.head_joint_index
        } else if name == names.left_hand {
            &mut geometry.left_hand_joint_index
        } else if name == names.right_hand {
            &mut geometry.right_hand_joint_index
        } else {
            continue;
        };
        *slot = Some(index);
    }

    let lookup = |names: &[String]| -> Vec<usize> {
        names
            .iter()
            .filter_map(|name| geometry.joint_indices.get(name).copied())
            .collect()
    };
    let left_fingers = lookup(&config.left_fingers);
    let right_fingers = lookup(&config.right_fingers);
    let left_fingertips = lookup(&config.left_fingertips);
    let right_fingertips = lookup(&config.right_fingertips);
    geometry.left_finger_joint_indices = left_fingers;
    geometry.right_finger_joint_indices = right_fingers;
    geometry.left_fingertip_joint_indices = left_fingertips;
    geometry.right_fingertip_joint_indices = right_fingertips;

    if let Some(neck) = geometry.neck_joint_index.and_then(|index| geometry.joints.get(index)) {
        geometry.neck_pivot = neck.transform.extract_translation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fbx::types::Property;
    use crate::mapping::parse_mapping;

    fn model(name: &str, translation: Vec3) -> Model {
        Model {
            name: name.to_string(),
            translation,
            ..Default::default()
        }
    }

    fn models(entries: &[(&str, Vec3)]) -> IndexMap<String, Model> {
        entries
            .iter()
            .map(|(name, translation)| (name.to_string(), model(name, *translation)))
            .collect()
    }

    fn entry(name: &str, values: &[f64]) -> Node {
        let mut node = Node::new("P");
        node.properties.push(Property::String(name.as_bytes().to_vec()));
        for _ in 0..3 {
            node.properties.push(Property::String(Vec::new()));
        }
        node.properties.extend(values.iter().map(|v| Property::F64(*v)));
        node
    }

    #[test]
    fn test_read_model_properties() {
        let mut block = Node::new("Properties70");
        block.children.push(entry("Lcl Translation", &[1.0, 2.0, 3.0]));
        block.children.push(entry("Lcl Rotation", &[0.0, 0.0, 90.0]));
        block.children.push(entry("RotationPivot", &[0.0, 1.0, 0.0]));
        block.children.push(entry("Lcl Scaling", &[2.0, 2.0, 2.0]));
        block.children.push(entry("RotationMin", &[-45.0, -10.0, 0.0]));
        block.children.push(entry("RotationMinX", &[1.0]));
        let mut object = Node::new("Model");
        object.properties.push(Property::I64(42));
        object.properties.push(Property::String(b"Spine\0\x01Model".to_vec()));
        object.properties.push(Property::String(b"LimbNode".to_vec()));
        object.children.push(block);

        let model = Model::read(&object);
        assert_eq!(model.name, "Spine");
        assert_eq!(model.translation, Vec3::new(1.0, 2.0, 3.0));
        assert!((model.pre_transform.extract_translation() - Vec3::Y).length() < 1e-6);
        assert!((model.rotation * Vec3::X - Vec3::Y).length() < 1e-5);
        assert!((model.rotation_min.x + 45.0_f32.to_radians()).abs() < 1e-5);
        assert!((model.rotation_min.y + std::f32::consts::PI).abs() < 1e-5);
        assert!((model.rotation_max.z - std::f32::consts::PI).abs() < 1e-5);

        // rotation happens about the pivot
        let origin = model.local_transform().transform_point3(Vec3::ZERO);
        let expected = Vec3::new(1.0, 2.0, 3.0) + Vec3::Y + model.rotation * Vec3::NEG_Y;
        assert!((origin - expected).length() < 1e-4, "{:?} vs {:?}", origin, expected);
    }

    #[test]
    fn test_model_name_without_class() {
        let mut object = Node::new("Model");
        object.properties.push(Property::Text("Model::Hips".into()));
        object.properties.push(Property::Text("Limb".into()));
        assert_eq!(model_name(&object), "Hips");
    }

    #[test]
    fn test_order_parents_first() {
        let models = models(&[
            ("Hand", Vec3::X),
            ("Hips", Vec3::Y),
            ("Arm", Vec3::X),
            ("Head", Vec3::Y),
        ]);
        let mut graph = ConnectionGraph::new();
        graph.connect("Hand", "Arm");
        graph.connect("Arm", "Hips");
        graph.connect("Head", "Hips");
        graph.connect("Hips", "Scene");

        let order = order_models(&graph, &models);
        let ids: Vec<_> = order.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["Hips", "Arm", "Hand", "Head"]);
        assert_eq!(order[0].parent_index, None);
        assert_eq!(order[2].parent_index, Some(1));
        assert_eq!(order[3].parent_index, Some(0));
        for (index, entry) in order.iter().enumerate() {
            assert!(entry.parent_index.map_or(true, |parent| parent < index));
        }
    }

    #[test]
    fn test_cycle_terminates() {
        let models = models(&[("A", Vec3::ZERO), ("B", Vec3::ZERO), ("C", Vec3::ZERO)]);
        let mut graph = ConnectionGraph::new();
        graph.connect("A", "B");
        graph.connect("B", "A");

        let order = order_models(&graph, &models);
        let ids: Vec<_> = order.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["C", "A", "B"]);
        assert_eq!(top_model_id(&graph, &models, "A"), "B");
        let _ = global_transform(&graph, &models, "A");
    }

    #[test]
    fn test_reparent_skinned_models() {
        let models = models(&[("Body", Vec3::ZERO), ("Hips", Vec3::ZERO), ("Spine", Vec3::Y)]);
        let mut graph = ConnectionGraph::new();
        graph.connect("Spine", "Hips");
        graph.connect("Body", "Scene");
        graph.connect("BodyMesh", "Body");
        graph.connect("Skin", "BodyMesh");
        graph.connect("Cluster1", "Skin");
        graph.connect("Spine", "Cluster1");
        // a model with a deformer child
        graph.connect("Skin", "Body");

        reparent_skinned_models(&mut graph, &models, |id| id == "Cluster1");
        assert_eq!(graph.parent("Body"), Some("Hips"));
        let order = order_models(&graph, &models);
        let ids: Vec<_> = order.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["Hips", "Spine", "Body"]);
    }

    #[test]
    fn test_build_joints() {
        let models = models(&[("Hips", Vec3::new(0.0, 1.0, 0.0)), ("Spine", Vec3::new(0.0, 2.0, 0.0)), ("Head", Vec3::new(0.0, 0.5, 0.0))]);
        let mut graph = ConnectionGraph::new();
        graph.connect("Spine", "Hips");
        graph.connect("Head", "Spine");
        let order = order_models(&graph, &models);

        let config = ImportConfig::from_mapping(&parse_mapping(b"freeJoint = Spine\nscale = 2\n"));
        let joints = build_joints(&models, &order, &config, config.offset);

        assert_eq!(joints.len(), 3);
        assert!((joints[0].position() - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
        assert!((joints[2].position() - Vec3::new(0.0, 7.0, 0.0)).length() < 1e-5);
        assert!((joints[1].distance_to_parent - 4.0).abs() < 1e-5);
        assert_eq!(joints[0].distance_to_parent, 0.0);
        assert!(joints[0].free_lineage.is_empty());
        assert_eq!(joints[1].free_lineage, vec![1]);
        assert_eq!(joints[2].free_lineage, vec![2, 1]);
        assert_eq!(joints[2].bind_transform, joints[2].transform);
    }

    #[test]
    fn test_free_lineage_stops_at_nearest_free() {
        let models = models(&[
            ("A", Vec3::ZERO),
            ("B", Vec3::Y),
            ("C", Vec3::Y),
            ("D", Vec3::Y),
            ("E", Vec3::X),
        ]);
        let mut graph = ConnectionGraph::new();
        graph.connect("B", "A");
        graph.connect("C", "B");
        graph.connect("D", "C");
        graph.connect("E", "A");
        let order = order_models(&graph, &models);
        let ids: Vec<_> = order.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C", "D", "E"]);

        let none_free = build_joints(&models, &order, &ImportConfig::default(), Mat4::IDENTITY);
        assert!(none_free.iter().all(|joint| joint.free_lineage.is_empty()));

        let config = ImportConfig::from_mapping(&parse_mapping(b"freeJoint = A\nfreeJoint = C\n"));
        let joints = build_joints(&models, &order, &config, Mat4::IDENTITY);
        assert_eq!(joints[0].free_lineage, vec![0]);
        assert_eq!(joints[1].free_lineage, vec![1, 0]);
        assert_eq!(joints[2].free_lineage, vec![2]);
        assert_eq!(joints[3].free_lineage, vec![3, 2]);
        assert_eq!(joints[4].free_lineage, vec![4, 0]);
        assert!((joints[3].distance_to_parent - 1.0).abs() < 1e-6);
        assert!((joints[4].distance_to_parent - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_inverse_default_rotation_accumulates() {
        let mut models = models(&[("A", Vec3::ZERO), ("B", Vec3::ZERO)]);
        models[0].rotation = Quat::from_rotation_y(0.5);
        models[1].pre_rotation = Quat::from_rotation_x(0.25);
        let mut graph = ConnectionGraph::new();
        graph.connect("B", "A");
        let order = order_models(&graph, &models);
        let joints = build_joints(&models, &order, &ImportConfig::default(), Mat4::IDENTITY);

        let expected = Quat::from_rotation_x(0.25).inverse() * Quat::from_rotation_y(0.5).inverse();
        assert!(joints[1].inverse_default_rotation.angle_between(expected) < 1e-5);
        assert_eq!(joints[1].inverse_bind_rotation, joints[1].inverse_default_rotation);
    }

    #[test]
    fn test_special_joints() {
        let models = models(&[("Hips", Vec3::ZERO), ("NeckRot", Vec3::new(0.0, 3.0, 0.0)), ("EyeL", Vec3::X), ("Thumb", Vec3::X)]);
        let mut graph = ConnectionGraph::new();
        graph.connect("NeckRot", "Hips");
        graph.connect("EyeL", "NeckRot");
        graph.connect("Thumb", "Hips");
        let order = order_models(&graph, &models);
        let config = ImportConfig::from_mapping(&parse_mapping(
            b"joint = jointRoot = Hips\njoint = jointLeftFingers = Thumb = Missing\n",
        ));

        let mut geometry = Geometry {
            joints: build_joints(&models, &order, &config, Mat4::IDENTITY),
            ..Default::default()
        };
        for (index, joint) in geometry.joints.iter().enumerate() {
            geometry.joint_indices.insert(joint.name.clone(), index);
        }
        assign_special_joints(&mut geometry, &config);

        assert_eq!(geometry.root_joint_index, Some(0));
        assert_eq!(geometry.neck_joint_index, Some(1));
        assert_eq!(geometry.left_eye_joint_index, Some(2));
        assert_eq!(geometry.right_eye_joint_index, None);
        assert_eq!(geometry.left_finger_joint_indices, vec![3]);
        assert!((geometry.neck_pivot - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-6);
    }
}
