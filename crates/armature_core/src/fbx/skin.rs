//! Skin clusters: per-joint vertex weights and bind matrices.

use armature_math::{Mat4, Mat4Ext, Vec4};

use super::extract::ExtractedMesh;
use super::types::Node;
use crate::mesh::Cluster;
use crate::scene::Joint;

/// Number of influences kept per vertex.
pub const MAX_INFLUENCES: usize = 4;

/// A `Cluster` deformer as read from the document.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCluster {
    /// Source vertex indices
    pub indices: Vec<i32>,
    pub weights: Vec<f64>,

    /// Global bind transform of the joint
    pub transform_link: Mat4,
}

impl Default for RawCluster {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            weights: Vec::new(),
            transform_link: Mat4::IDENTITY,
        }
    }
}

impl RawCluster {
    /// `(source vertex, weight)` pairs; a missing weight reads as zero.
    pub fn influences(&self) -> impl Iterator<Item = (i32, f32)> + '_ {
        self.indices
            .iter()
            .enumerate()
            .map(|(i, &index)| (index, self.weights.get(i).copied().unwrap_or(0.0) as f32))
    }
}

/// Read a `Deformer` node of class `Cluster`.
pub fn read_cluster(object: &Node) -> RawCluster {
    let mut cluster = RawCluster::default();
    for data in &object.children {
        match data.name.as_str() {
            "Indexes" => cluster.indices = data.int_vector(),
            "Weights" => cluster.weights = data.double_vector(),
            "TransformLink" => {
                let values = data.double_vector();
                if values.len() == 16 {
                    let mut columns = [0.0f32; 16];
                    for (dst, src) in columns.iter_mut().zip(&values) {
                        *dst = *src as f32;
                    }
                    cluster.transform_link = Mat4::from_cols_array(&columns);
                } else {
                    log::warn!("TransformLink with {} values, expected 16", values.len());
                }
            }
            _ => {}
        }
    }
    cluster
}

/// Bind `raw` to `joint_index` for a mesh whose model sits at
/// `model_transform`.
pub fn bind_cluster(raw: &RawCluster, joint_index: usize, model_transform: Mat4) -> Cluster {
    Cluster {
        joint_index,
        inverse_bind_matrix: raw.transform_link.inverse() * model_transform,
    }
}

/// Replace the joint's default-pose bind data with the cluster's link.
pub fn apply_bind_pose(joint: &mut Joint, transform_link: Mat4) {
    joint.inverse_bind_rotation = transform_link.extract_rotation().inverse();
    joint.bind_transform = transform_link;
}

/// Pack cluster weights into four slots per output vertex.
///
/// Each influence takes the first slot still at zero weight; influences past
/// the fourth are dropped. Weights are not renormalized.
pub fn pack_weights(extracted: &mut ExtractedMesh, clusters: &[RawCluster]) {
    let vertex_count = extracted.mesh.vertices.len();
    let mut indices = vec![[0u32; MAX_INFLUENCES]; vertex_count];
    let mut weights = vec![Vec4::ZERO; vertex_count];
    let mut dropped = 0usize;

    for (cluster_index, cluster) in clusters.iter().enumerate() {
        for (original, weight) in cluster.influences() {
            for &output in extracted.output_indices(original) {
                let output = output as usize;
                let (Some(slots), Some(slot_indices)) = (weights.get_mut(output), indices.get_mut(output)) else {
                    continue;
                };
                match (0..MAX_INFLUENCES).find(|&slot| slots[slot] == 0.0) {
                    Some(slot) => {
                        slot_indices[slot] = cluster_index as u32;
                        slots[slot] = weight;
                    }
                    None => dropped += 1,
                }
            }
        }
    }
    if dropped > 0 {
        log::debug!("Dropped {} influences beyond {} per vertex", dropped, MAX_INFLUENCES);
    }

    extracted.mesh.cluster_indices = indices;
    extracted.mesh.cluster_weights = weights;
}
