//! High-level FBX loading.
//!
//! This module is the entry point for turning an FBX document plus its
//! mapping file into a [`Geometry`]. The document is parsed into a node tree,
//! object records are collected by kind, and the connection graph stitches
//! them into joints and skinned meshes.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use armature_math::{Mat4, Mat4Ext, Vec3};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use super::blendshape::{merge_shape, read_shape, BlendshapeTable, RawShape};
use super::collision::{fit_joint_shapes, BoneFrame, JointShapeInfo, EXPANSION_WEIGHT_THRESHOLD};
use super::connections::ConnectionGraph;
use super::extract::{extract_mesh, ExtractedMesh};
use super::hierarchy::{
    assign_special_joints, build_joints, global_transform, order_models, reparent_skinned_models, Model,
};
use super::parser::{parse_fbx, ParseError};
use super::skin::{apply_bind_pose, bind_cluster, pack_weights, read_cluster, RawCluster};
use super::types::{process_id, Node};
use crate::config::{ImportConfig, ReadOptions, UnresolvedPolicy};
use crate::mapping::{parse_mapping, Mapping};
use crate::mesh::{Cluster, DEFAULT_SHININESS};
use crate::scene::{Attachment, Geometry};

/// A reference to a model that is not in the joint list.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum UnresolvedReference {
    #[error("cluster of mesh {mesh} binds {joint}, which is not in the model list")]
    ClusterJoint { mesh: String, joint: String },

    #[error("mesh {mesh} belongs to {model}, which is not in the model list")]
    MeshModel { mesh: String, model: String },

    #[error("attachment names unknown joint {joint}")]
    AttachmentJoint { joint: String },
}

/// Errors that can occur during FBX loading.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unresolved reference: {0}")]
    Unresolved(#[from] UnresolvedReference),
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Load an FBX file and its optional mapping file from disk.
///
/// # Example
///
/// ```ignore
/// use armature_core::fbx::load_fbx;
///
/// let geometry = load_fbx("avatar.fbx", Some("avatar.fst"))?;
/// ```
pub fn load_fbx<P: AsRef<Path>>(path: P, mapping_path: Option<P>) -> LoadResult<Geometry> {
    let path = path.as_ref();
    let model = std::fs::read(path)?;
    let mapping = match mapping_path {
        Some(mapping_path) => parse_mapping(&std::fs::read(mapping_path.as_ref())?),
        None => Mapping::new(),
    };
    log::debug!("Loading {}", path.display());
    read_fbx_with(&model, &mapping, &ReadOptions::default())
}

/// Read a document and mapping file already in memory, with lenient
/// reference resolution.
pub fn read_fbx(model: &[u8], mapping: &[u8]) -> LoadResult<Geometry> {
    read_fbx_with(model, &parse_mapping(mapping), &ReadOptions::default())
}

/// Read a document with a parsed mapping and explicit options.
pub fn read_fbx_with(model: &[u8], mapping: &Mapping, options: &ReadOptions) -> LoadResult<Geometry> {
    let root = parse_fbx(model)?;
    let config = ImportConfig::from_mapping(mapping);
    extract_geometry(&root, &config, options)
}

/// Assemble a [`Geometry`] from a parsed document tree.
pub fn extract_geometry(root: &Node, config: &ImportConfig, options: &ReadOptions) -> LoadResult<Geometry> {
    let objects = Objects::collect(root, config);
    let mut builder = GeometryBuilder::new(objects, ConnectionGraph::from_document(root), config, options);
    builder.merge_blendshapes();
    builder.build_skeleton();
    builder.process_meshes()?;
    builder.process_attachments()?;
    Ok(builder.finish())
}

/// Surface properties of a `Material` object.
#[derive(Clone, Copy, Debug)]
struct Material {
    diffuse: Vec3,
    specular: Vec3,
    shininess: f32,
}

impl Material {
    fn read(object: &Node) -> Self {
        let mut material = Self {
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            shininess: DEFAULT_SHININESS,
        };
        for (entry, index) in object.object_properties() {
            match entry.string_at(0).as_ref() {
                "DiffuseColor" => material.diffuse = entry.vec3_at(index),
                "SpecularColor" => material.specular = entry.vec3_at(index),
                "Shininess" => material.shininess = entry.f64_at(index) as f32,
                _ => {}
            }
        }
        material
    }
}

/// File name of a `Texture` object with any directory removed.
fn texture_filename(object: &Node) -> Option<String> {
    let path = object.child("RelativeFilename")?.string_at(0);
    let start = path.rfind(['/', '\\']).map_or(0, |index| index + 1);
    Some(path[start..].to_string())
}

/// Class name carried as the last property of an object record.
fn object_class(object: &Node) -> Cow<'_, str> {
    object.properties.last().map(|p| p.to_text()).unwrap_or(Cow::Borrowed(""))
}

/// Object records of one document, keyed by ID.
#[derive(Default)]
struct Objects {
    meshes: IndexMap<String, ExtractedMesh>,
    shapes: Vec<RawShape>,
    models: IndexMap<String, Model>,
    textures: HashMap<String, String>,
    materials: HashMap<String, Material>,
    clusters: HashMap<String, RawCluster>,
    channels: HashMap<String, Vec<(usize, f32)>>,
}

impl Objects {
    fn collect(root: &Node, config: &ImportConfig) -> Self {
        let table = BlendshapeTable::new(&config.blendshape_overrides);
        let mut objects = Self::default();
        for section in root.children_named("Objects") {
            for object in &section.children {
                objects.add(object, &table);
            }
        }
        log::debug!(
            "Collected {} models, {} meshes, {} shapes, {} clusters",
            objects.models.len(),
            objects.meshes.len(),
            objects.shapes.len(),
            objects.clusters.len()
        );
        objects
    }

    fn add(&mut self, object: &Node, table: &BlendshapeTable) {
        let id = object.id(0);
        match object.name.as_str() {
            "Geometry" => {
                if object_class(object) == "Shape" {
                    self.shapes.push(read_shape(object));
                } else {
                    self.meshes.insert(id, extract_mesh(object));
                }
            }
            "Model" => {
                // FBX 6 keeps mesh data on the model itself
                if object.child("Vertices").is_some() {
                    self.meshes.insert(id.clone(), extract_mesh(object));
                }
                self.models.insert(id, Model::read(object));
            }
            "Texture" => {
                if let Some(filename) = texture_filename(object) {
                    self.textures.insert(id, filename);
                }
            }
            "Material" => {
                self.materials.insert(id, Material::read(object));
            }
            "Deformer" => match object_class(object).as_ref() {
                "Cluster" => {
                    self.clusters.insert(id, read_cluster(object));
                }
                "BlendShapeChannel" => {
                    self.channels.insert(id, table.channel_targets(object));
                }
                _ => {}
            },
            other => log::debug!("Ignoring object {} of kind {}", id, other),
        }
    }

    /// True when any material has a texture connected to it.
    fn materials_have_textures(&self, graph: &ConnectionGraph) -> bool {
        self.materials
            .keys()
            .any(|material| graph.children(material).iter().any(|child| self.textures.contains_key(child)))
    }
}

/// Internal builder for assembling a Geometry from collected objects.
struct GeometryBuilder<'a> {
    objects: Objects,
    graph: ConnectionGraph,
    config: &'a ImportConfig,
    options: &'a ReadOptions,
    geometry: Geometry,

    /// Model ID -> joint index
    model_indices: HashMap<String, usize>,
    shape_infos: Vec<JointShapeInfo>,
}

impl<'a> GeometryBuilder<'a> {
    fn new(objects: Objects, graph: ConnectionGraph, config: &'a ImportConfig, options: &'a ReadOptions) -> Self {
        let geometry = Geometry {
            offset: config.offset,
            palm_direction: config.palm_direction,
            ..Default::default()
        };
        Self {
            objects,
            graph,
            config,
            options,
            geometry,
            model_indices: HashMap::new(),
            shape_infos: Vec::new(),
        }
    }

    /// Hand an unresolved reference to the caller's policy.
    fn unresolved(&mut self, reference: UnresolvedReference) -> LoadResult<()> {
        match self.options.unresolved {
            UnresolvedPolicy::Strict => Err(reference.into()),
            UnresolvedPolicy::Fallback => {
                log::warn!("{}", reference);
                self.geometry.unresolved.push(reference);
                Ok(())
            }
        }
    }

    /// Route each shape through its channel onto the mesh that owns it.
    fn merge_blendshapes(&mut self) {
        let Objects {
            meshes,
            shapes,
            channels,
            ..
        } = &mut self.objects;
        for shape in shapes.iter() {
            let channel = self.graph.parent(&shape.id);
            let targets = channel.and_then(|id| channels.get(id)).map(Vec::as_slice).unwrap_or(&[]);
            let mesh_id = channel
                .and_then(|id| self.graph.parent(id))
                .and_then(|blendshape| self.graph.parent(blendshape));
            match mesh_id.and_then(|id| meshes.get_mut(id)) {
                Some(extracted) => merge_shape(extracted, shape, targets),
                None => log::debug!("Shape {} is not connected to a mesh", shape.id),
            }
        }
    }

    fn build_skeleton(&mut self) {
        let clusters = &self.objects.clusters;
        reparent_skinned_models(&mut self.graph, &self.objects.models, |id| clusters.contains_key(id));

        let order = order_models(&self.graph, &self.objects.models);
        let joints = build_joints(&self.objects.models, &order, self.config, self.config.offset);

        for (index, entry) in order.iter().enumerate() {
            self.model_indices.insert(entry.id.clone(), index);
        }
        for (index, joint) in joints.iter().enumerate() {
            self.geometry.joint_indices.insert(joint.name.clone(), index);
        }
        self.shape_infos = vec![JointShapeInfo::default(); joints.len()];
        self.geometry.joints = joints;
        assign_special_joints(&mut self.geometry, self.config);
    }

    fn process_meshes(&mut self) -> LoadResult<()> {
        let materials_have_textures = self.objects.materials_have_textures(&self.graph);
        let meshes = std::mem::take(&mut self.objects.meshes);
        for (mesh_id, extracted) in meshes {
            self.process_mesh(&mesh_id, extracted, materials_have_textures)?;
        }
        Ok(())
    }

    fn process_mesh(&mut self, mesh_id: &str, mut extracted: ExtractedMesh, materials_have_textures: bool) -> LoadResult<()> {
        let model_id = if self.objects.models.contains_key(mesh_id) {
            Some(mesh_id.to_string())
        } else {
            self.graph.parent(mesh_id).map(str::to_string)
        };
        let model_id = model_id.unwrap_or_default();
        let model_name = self.objects.models.get(&model_id).map(|m| m.name.as_str()).unwrap_or("");
        let model_transform = global_transform(&self.graph, &self.objects.models, &model_id);

        extracted.mesh.springiness = self.config.springiness(model_name);

        let generate_tangents = self.assign_materials(&model_id, &mut extracted, materials_have_textures);
        if generate_tangents {
            extracted.mesh.compute_tangents();
        }

        let raw_clusters = self.bind_clusters(mesh_id, &mut extracted, model_transform)?;
        if extracted.mesh.clusters.is_empty() {
            let joint_index = match self.model_indices.get(&model_id) {
                Some(&index) => index,
                None => {
                    self.unresolved(UnresolvedReference::MeshModel {
                        mesh: mesh_id.to_string(),
                        model: model_id.clone(),
                    })?;
                    0
                }
            };
            extracted.mesh.clusters.push(Cluster::identity(joint_index));
        }

        let eyes = [self.geometry.left_eye_joint_index, self.geometry.right_eye_joint_index];
        extracted.mesh.is_eye = extracted
            .mesh
            .clusters
            .iter()
            .any(|cluster| eyes.contains(&Some(cluster.joint_index)));

        if extracted.mesh.is_skinned() {
            pack_weights(&mut extracted, &raw_clusters);
        }
        self.accumulate_shapes(&extracted, &raw_clusters, model_transform);

        if extracted.mesh.springiness > 0.0 {
            extracted.mesh.extract_spring_edges();
        }

        extracted.mesh.compute_extents(model_transform);
        self.geometry.mesh_extents.add_extents(&extracted.mesh.mesh_extents);
        self.geometry.meshes.push(extracted.mesh);
        Ok(())
    }

    /// Copy material and texture data onto the parts of a mesh, walking the
    /// model's children in connection order. Returns true when a normal map
    /// was assigned.
    fn assign_materials(&self, model_id: &str, extracted: &mut ExtractedMesh, materials_have_textures: bool) -> bool {
        let objects = &self.objects;
        let mut generate_tangents = false;
        let mut material_index = 0;
        let mut texture_index = 0;

        for child in self.graph.children(model_id) {
            if let Some(material) = objects.materials.get(child) {
                let diffuse_filename = self.graph.diffuse_texture(child).and_then(|texture| {
                    // 3ds Max exports put an intermediate texture in between
                    let nested = self
                        .graph
                        .children(texture)
                        .iter()
                        .filter_map(|id| objects.textures.get(id))
                        .last();
                    nested.or_else(|| objects.textures.get(texture)).cloned()
                });
                let normal_filename = self
                    .graph
                    .bump_texture(child)
                    .and_then(|texture| objects.textures.get(texture))
                    .cloned();
                generate_tangents |= normal_filename.is_some();

                let parts = extracted.mesh.parts.iter_mut().zip(&extracted.part_material_textures);
                for (part, &(part_material, _)) in parts {
                    if part_material != material_index {
                        continue;
                    }
                    part.diffuse_color = material.diffuse;
                    part.specular_color = material.specular;
                    part.shininess = material.shininess;
                    if diffuse_filename.is_some() {
                        part.diffuse_filename = diffuse_filename.clone();
                    }
                    if normal_filename.is_some() {
                        part.normal_filename = normal_filename.clone();
                    }
                }
                material_index += 1;
            } else if let Some(filename) = objects.textures.get(child) {
                let parts = extracted.mesh.parts.iter_mut().zip(&extracted.part_material_textures);
                for (part, &(_, part_texture)) in parts {
                    if part_texture == texture_index && !(part_texture == 0 && materials_have_textures) {
                        part.diffuse_filename = Some(filename.clone());
                    }
                }
                texture_index += 1;
            }
        }
        generate_tangents
    }

    /// Bind every skin cluster hanging off `mesh_id`'s deformers. Returns the
    /// raw clusters in the same order as the mesh's bound clusters.
    fn bind_clusters(
        &mut self,
        mesh_id: &str,
        extracted: &mut ExtractedMesh,
        model_transform: Mat4,
    ) -> LoadResult<Vec<RawCluster>> {
        let mut found: Vec<(RawCluster, String)> = Vec::new();
        for deformer in self.graph.children(mesh_id) {
            for cluster_id in self.graph.children(deformer) {
                if let Some(raw) = self.objects.clusters.get(cluster_id) {
                    let joint_id = self.graph.first_child(cluster_id).unwrap_or_default();
                    found.push((raw.clone(), joint_id.to_string()));
                }
            }
        }

        let mut raw_clusters = Vec::with_capacity(found.len());
        for (raw, joint_id) in found {
            let joint_index = match self.model_indices.get(&joint_id) {
                Some(&index) => {
                    self.bind_joint(index, raw.transform_link);
                    index
                }
                None => {
                    self.unresolved(UnresolvedReference::ClusterJoint {
                        mesh: mesh_id.to_string(),
                        joint: joint_id,
                    })?;
                    0
                }
            };
            extracted.mesh.clusters.push(bind_cluster(&raw, joint_index, model_transform));
            raw_clusters.push(raw);
        }
        Ok(raw_clusters)
    }

    /// Move a joint into its skin bind pose and grow the bind extents.
    fn bind_joint(&mut self, joint_index: usize, transform_link: Mat4) {
        let Some(joint) = self.geometry.joints.get_mut(joint_index) else {
            return;
        };
        apply_bind_pose(joint, transform_link);

        let position = (self.geometry.offset * transform_link).extract_translation();
        self.geometry.bind_extents.add_point(position);
        if self.geometry.is_static_joint(joint_index) {
            self.geometry.static_extents.add_point(position);
        }
    }

    /// Feed the mesh's vertices to the shape accumulators of the joints that
    /// drive them.
    fn accumulate_shapes(&mut self, extracted: &ExtractedMesh, raw_clusters: &[RawCluster], model_transform: Mat4) {
        let joints = &self.geometry.joints;
        let mesh = &extracted.mesh;

        if mesh.is_skinned() {
            for (cluster, raw) in mesh.clusters.iter().zip(raw_clusters) {
                let Some(info) = self.shape_infos.get_mut(cluster.joint_index) else {
                    continue;
                };
                let frame = BoneFrame::new(joints, cluster.joint_index, model_transform, cluster.inverse_bind_matrix);
                for (original, weight) in raw.influences() {
                    if weight <= EXPANSION_WEIGHT_THRESHOLD {
                        continue;
                    }
                    for &output in extracted.output_indices(original) {
                        if let Some(vertex) = mesh.vertices.get(output as usize) {
                            info.accumulate(&frame, *vertex);
                        }
                    }
                }
            }
        } else if let Some(cluster) = mesh.clusters.first() {
            let Some(info) = self.shape_infos.get_mut(cluster.joint_index) else {
                return;
            };
            let frame = BoneFrame::new(joints, cluster.joint_index, model_transform, cluster.inverse_bind_matrix);
            for vertex in &mesh.vertices {
                info.accumulate(&frame, *vertex);
            }
        }
    }

    fn process_attachments(&mut self) -> LoadResult<()> {
        let config = self.config;
        for spec in &config.attachments {
            let joint_index = self
                .geometry
                .joint_index(&spec.joint)
                .or_else(|| self.model_indices.get(process_id(&spec.joint)).copied());
            if joint_index.is_none() {
                self.unresolved(UnresolvedReference::AttachmentJoint {
                    joint: spec.joint.clone(),
                })?;
            }
            self.geometry.attachments.push(Attachment {
                joint_index,
                url: spec.url.clone(),
                translation: spec.translation,
                rotation: spec.rotation,
                scale: spec.scale,
            });
        }
        Ok(())
    }

    fn finish(mut self) -> Geometry {
        fit_joint_shapes(&mut self.geometry.joints, &self.shape_infos);
        log::info!(
            "Loaded {} joints, {} meshes ({} vertices), {} unresolved references",
            self.geometry.joints.len(),
            self.geometry.meshes.len(),
            self.geometry.vertex_count(),
            self.geometry.unresolved.len()
        );
        self.geometry
    }
}
