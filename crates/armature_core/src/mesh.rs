//! Mesh representation produced by the importer.
//!
//! Meshes keep the deduplicated vertex buffer, the parts that index into it,
//! and the skinning data needed to deform it. Nothing here is GPU specific.

use std::collections::BTreeSet;

use armature_math::{Extents, Mat4, Quat, Vec2, Vec3, Vec4, EPSILON};
use serde::Serialize;

/// Shininess used when a material does not set one.
pub const DEFAULT_SHININESS: f32 = 96.0;

/// A subset of a mesh sharing one material/texture pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeshPart {
    /// Every 3 indices form a triangle
    pub triangle_indices: Vec<u32>,

    /// Every 4 indices form a quad
    pub quad_indices: Vec<u32>,

    pub diffuse_color: Vec3,
    pub specular_color: Vec3,
    pub shininess: f32,

    /// Diffuse texture file name (directory stripped)
    pub diffuse_filename: Option<String>,

    /// Normal map file name (directory stripped)
    pub normal_filename: Option<String>,
}

impl Default for MeshPart {
    fn default() -> Self {
        Self {
            triangle_indices: Vec::new(),
            quad_indices: Vec::new(),
            diffuse_color: Vec3::ONE,
            specular_color: Vec3::ONE,
            shininess: DEFAULT_SHININESS,
            diffuse_filename: None,
            normal_filename: None,
        }
    }
}

impl MeshPart {
    pub fn triangle_count(&self) -> usize {
        self.triangle_indices.len() / 3
    }

    pub fn quad_count(&self) -> usize {
        self.quad_indices.len() / 4
    }
}

/// Sparse per-vertex deltas for one morph target.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Blendshape {
    /// Output vertex indices touched by this shape
    pub indices: Vec<u32>,

    /// Position delta for each entry in `indices`
    pub vertices: Vec<Vec3>,

    /// Normal delta for each entry in `indices`
    pub normals: Vec<Vec3>,
}

impl Blendshape {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Binding of a mesh to one joint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cluster {
    pub joint_index: usize,

    /// Takes mesh-space points into the joint's bind space
    pub inverse_bind_matrix: Mat4,
}

impl Cluster {
    /// A cluster that binds the whole mesh rigidly to `joint_index`.
    pub fn identity(joint_index: usize) -> Self {
        Self {
            joint_index,
            inverse_bind_matrix: Mat4::IDENTITY,
        }
    }
}

/// A skinned, possibly blend-shaped mesh.
#[derive(Clone, Debug, Serialize)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,

    /// Summed corner normals; not renormalized
    pub normals: Vec<Vec3>,

    /// Only filled when a part carries a normal map
    pub tangents: Vec<Vec3>,

    pub tex_coords: Vec<Vec2>,
    pub colors: Vec<Vec3>,

    pub parts: Vec<MeshPart>,
    pub blendshapes: Vec<Blendshape>,

    /// Never empty once assembled
    pub clusters: Vec<Cluster>,

    /// Per vertex: up to four indices into `clusters` (empty when there is
    /// only one cluster)
    pub cluster_indices: Vec<[u32; 4]>,
    pub cluster_weights: Vec<Vec4>,

    pub springiness: f32,

    /// Undirected `(low, high)` vertex pairs
    pub spring_edges: Vec<(u32, u32)>,

    /// Per vertex: the neighbour pairs of every face corner it appears in
    pub vertex_connections: Vec<Vec<(u32, u32)>>,

    /// Bound to an eye joint
    pub is_eye: bool,

    /// Extents of the vertices under `model_transform`
    pub mesh_extents: Extents,
    pub model_transform: Mat4,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            normals: Vec::new(),
            tangents: Vec::new(),
            tex_coords: Vec::new(),
            colors: Vec::new(),
            parts: Vec::new(),
            blendshapes: Vec::new(),
            clusters: Vec::new(),
            cluster_indices: Vec::new(),
            cluster_weights: Vec::new(),
            springiness: 0.0,
            spring_edges: Vec::new(),
            vertex_connections: Vec::new(),
            is_eye: false,
            mesh_extents: Extents::EMPTY,
            model_transform: Mat4::IDENTITY,
        }
    }
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(MeshPart::triangle_count).sum()
    }

    pub fn quad_count(&self) -> usize {
        self.parts.iter().map(MeshPart::quad_count).sum()
    }

    /// True when vertices blend between several clusters.
    pub fn is_skinned(&self) -> bool {
        self.clusters.len() > 1
    }

    /// Record `transform` and the extents of the vertices under it.
    pub fn compute_extents(&mut self, transform: Mat4) {
        self.model_transform = transform;
        self.mesh_extents.reset();
        for vertex in &self.vertices {
            self.mesh_extents.add_point(transform.transform_point3(*vertex));
        }
    }

    /// Accumulate per-vertex tangents over every face edge.
    ///
    /// Does nothing without texture coordinates.
    pub fn compute_tangents(&mut self) {
        if self.tex_coords.is_empty() {
            return;
        }
        self.tangents = vec![Vec3::ZERO; self.vertices.len()];

        let mut edges = Vec::new();
        for part in &self.parts {
            for quad in part.quad_indices.chunks_exact(4) {
                edges.extend([(quad[0], quad[1]), (quad[1], quad[2]), (quad[2], quad[3]), (quad[3], quad[0])]);
            }
            for triangle in part.triangle_indices.chunks_exact(3) {
                edges.extend([
                    (triangle[0], triangle[1]),
                    (triangle[1], triangle[2]),
                    (triangle[2], triangle[0]),
                ]);
            }
        }
        for (first, second) in edges {
            self.add_tangent(first as usize, second as usize);
        }
    }

    fn add_tangent(&mut self, first: usize, second: usize) {
        let (Some(normal), Some(v1), Some(v2), Some(t1), Some(t2)) = (
            self.normals.get(first),
            self.vertices.get(first),
            self.vertices.get(second),
            self.tex_coords.get(first),
            self.tex_coords.get(second),
        ) else {
            return;
        };

        let bitangent = normal.cross(*v2 - *v1);
        if bitangent.length() < EPSILON {
            return;
        }
        let delta = *t2 - *t1;
        let normal = normal.normalize();
        let rotation = Quat::from_axis_angle(normal, -(-delta.y).atan2(delta.x));
        let tangent = (rotation * bitangent.normalize()).cross(normal);
        if let Some(slot) = self.tangents.get_mut(first) {
            *slot += tangent;
        }
    }

    /// Build the spring edge list and per-vertex neighbour pairs.
    pub fn extract_spring_edges(&mut self) {
        let mut edges = BTreeSet::new();
        let mut connections = vec![Vec::new(); self.vertices.len()];
        let mut connect = |vertex: u32, previous: u32, next: u32| {
            if let Some(list) = connections.get_mut(vertex as usize) {
                list.push((previous, next));
            }
        };

        for part in &self.parts {
            for quad in part.quad_indices.chunks_exact(4) {
                let [a, b, c, d] = [quad[0], quad[1], quad[2], quad[3]];
                for (x, y) in [(a, b), (b, c), (c, d), (d, a)] {
                    edges.insert((x.min(y), x.max(y)));
                }
                connect(a, d, b);
                connect(b, a, c);
                connect(c, b, d);
                connect(d, c, a);
            }
            for triangle in part.triangle_indices.chunks_exact(3) {
                let [a, b, c] = [triangle[0], triangle[1], triangle[2]];
                for (x, y) in [(a, b), (b, c), (c, a)] {
                    edges.insert((x.min(y), x.max(y)));
                }
                connect(a, c, b);
                connect(b, a, c);
                connect(c, b, a);
            }
        }

        self.spring_edges = edges.into_iter().collect();
        self.vertex_connections = connections;
    }
}
