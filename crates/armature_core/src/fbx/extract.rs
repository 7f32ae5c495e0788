//! Geometry extraction for a single mesh object.
//!
//! Reads the raw layer arrays of a `Geometry` (or FBX 6 `Model`) node and
//! produces a deduplicated vertex buffer split into parts.
//!
//! # Supported
//!
//! - Positions and polygon indices (negative index closes a polygon)
//! - Normals, vertex colours and the first UV set, each either by vertex or
//!   by polygon corner, direct or through an index array
//! - Per-polygon material and texture indices
//!
//! # Not Supported
//!
//! - Additional UV sets
//! - Smoothing groups, edge creases, per-layer visibility

use std::collections::HashMap;

use armature_math::{Vec2, Vec3};

use super::types::Node;
use crate::mesh::{Mesh, MeshPart};

/// A mesh plus the bookkeeping needed to map source indices onto it.
#[derive(Clone, Debug, Default)]
pub struct ExtractedMesh {
    pub mesh: Mesh,

    /// Source vertex index -> output vertex indices, in creation order
    pub new_indices: HashMap<usize, Vec<u32>>,

    /// `(material, texture)` key of each part, by part index
    pub part_material_textures: Vec<(i32, i32)>,

    /// Per blendshape: output vertex -> position in the sparse lists
    pub(crate) blendshape_index_maps: Vec<HashMap<u32, usize>>,
}

impl ExtractedMesh {
    /// Output vertices created from source vertex `original`.
    pub fn output_indices(&self, original: i32) -> &[u32] {
        usize::try_from(original)
            .ok()
            .and_then(|index| self.new_indices.get(&index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One `LayerElement*` array with its addressing mode.
#[derive(Clone, Debug)]
struct Layer<T> {
    values: Vec<T>,
    indices: Vec<i32>,
    by_vertex: bool,
}

impl<T> Default for Layer<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            indices: Vec::new(),
            by_vertex: false,
        }
    }
}

impl<T: Copy> Layer<T> {
    fn read(layer: &Node, values_name: &str, index_names: &[&str], convert: fn(&[f64]) -> Vec<T>) -> Self {
        let mut out = Self::default();
        let mut index_to_direct = false;
        for data in &layer.children {
            if data.name == values_name {
                out.values = convert(&data.double_vector());
            } else if index_names.contains(&data.name.as_str()) {
                out.indices = data.int_vector();
            } else if data.name == "MappingInformationType" && data.property_is(0, "ByVertice") {
                out.by_vertex = true;
            } else if data.name == "ReferenceInformationType" && data.property_is(0, "IndexToDirect") {
                index_to_direct = true;
            }
        }
        // some exporters write IndexToDirect without the index array
        if index_to_direct && out.indices.is_empty() {
            out.by_vertex = true;
        }
        out
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value for a polygon corner, or `None` when any index is out of range.
    fn lookup(&self, vertex_index: usize, corner: usize) -> Option<T> {
        let index = if self.by_vertex { vertex_index } else { corner };
        if self.indices.is_empty() {
            return self.values.get(index).copied();
        }
        let mapped = usize::try_from(*self.indices.get(index)?).ok()?;
        self.values.get(mapped).copied()
    }
}

fn vec3s(values: &[f64]) -> Vec<Vec3> {
    values
        .chunks_exact(3)
        .map(|v| Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32))
        .collect()
}

fn rgb_from_rgba(values: &[f64]) -> Vec<Vec3> {
    values
        .chunks_exact(4)
        .map(|v| Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32))
        .collect()
}

/// UVs with `t` flipped to a top-left origin.
fn tex_coords(values: &[f64]) -> Vec<Vec2> {
    values
        .chunks_exact(2)
        .map(|v| Vec2::new(v[0] as f32, -(v[1] as f32)))
        .collect()
}

fn layer_index(layer: &Node) -> i64 {
    layer.property(0).and_then(|p| p.as_i64()).unwrap_or(0)
}

/// Dedup key: source vertex plus UV bit pattern (signed zeros folded).
type VertexKey = (usize, [u32; 2]);

fn vertex_key(original: usize, tex_coord: Vec2) -> VertexKey {
    let bits = |v: f32| if v == 0.0 { 0 } else { v.to_bits() };
    (original, [bits(tex_coord.x), bits(tex_coord.y)])
}

#[derive(Default)]
struct MeshBuilder {
    vertices: Vec<Vec3>,
    polygon_indices: Vec<i32>,
    normals: Layer<Vec3>,
    colors: Layer<Vec3>,
    tex_coords: Layer<Vec2>,
    materials: Vec<i32>,
    textures: Vec<i32>,

    extracted: ExtractedMesh,
    vertex_lookup: HashMap<VertexKey, u32>,
    part_lookup: HashMap<(i32, i32), usize>,
}

impl MeshBuilder {
    fn part_index(&mut self, polygon: usize) -> usize {
        let material = self.materials.get(polygon).copied().unwrap_or(0);
        let texture = self.textures.get(polygon).copied().unwrap_or(0);
        let extracted = &mut self.extracted;
        *self.part_lookup.entry((material, texture)).or_insert_with(|| {
            extracted.mesh.parts.push(MeshPart::default());
            extracted.part_material_textures.push((material, texture));
            extracted.mesh.parts.len() - 1
        })
    }

    /// Resolve the polygon corner at `corner` to an output vertex.
    fn resolve_corner(&mut self, corner: usize) -> u32 {
        let raw = i64::from(self.polygon_indices[corner]);
        let original = (if raw < 0 { -raw - 1 } else { raw }) as usize;

        let normal = self.normals.lookup(original, corner).unwrap_or(Vec3::ZERO);
        let tex_coord = self.tex_coords.lookup(original, corner).unwrap_or(Vec2::ZERO);

        let key = vertex_key(original, tex_coord);
        let mesh = &mut self.extracted.mesh;
        if let Some(&existing) = self.vertex_lookup.get(&key) {
            mesh.normals[existing as usize] += normal;
            return existing;
        }

        let index = mesh.vertices.len() as u32;
        mesh.vertices.push(self.vertices.get(original).copied().unwrap_or(Vec3::ZERO));
        mesh.normals.push(normal);
        if !self.tex_coords.is_empty() {
            mesh.tex_coords.push(tex_coord);
        }
        if !self.colors.is_empty() {
            mesh.colors.push(self.colors.lookup(original, corner).unwrap_or(Vec3::ONE));
        }
        self.vertex_lookup.insert(key, index);
        self.extracted.new_indices.entry(original).or_default().push(index);
        index
    }

    fn build(mut self) -> ExtractedMesh {
        let mut begin = 0;
        let mut polygon = 0;
        while begin < self.polygon_indices.len() {
            let mut end = begin;
            while end + 1 < self.polygon_indices.len() && self.polygon_indices[end] >= 0 {
                end += 1;
            }
            let corner_count = end + 1 - begin;

            if corner_count < 3 {
                log::debug!("Skipping degenerate polygon {} with {} corners", polygon, corner_count);
            } else {
                let part = self.part_index(polygon);
                let corners: Vec<u32> = (begin..=end).map(|corner| self.resolve_corner(corner)).collect();
                let part = &mut self.extracted.mesh.parts[part];
                if corners.len() == 4 {
                    part.quad_indices.extend_from_slice(&corners);
                } else {
                    for pair in corners[1..].windows(2) {
                        part.triangle_indices.extend_from_slice(&[corners[0], pair[0], pair[1]]);
                    }
                }
            }
            begin = end + 1;
            polygon += 1;
        }
        self.extracted
    }
}

/// Extract the deduplicated mesh carried by `object`.
///
/// Missing arrays are treated as empty; the result may have zero normals or
/// no parts at all, but extraction never fails.
pub fn extract_mesh(object: &Node) -> ExtractedMesh {
    let mut builder = MeshBuilder::default();
    for child in &object.children {
        match child.name.as_str() {
            "Vertices" => builder.vertices = vec3s(&child.double_vector()),
            "PolygonVertexIndex" => builder.polygon_indices = child.int_vector(),
            "LayerElementNormal" => builder.normals = Layer::read(child, "Normals", &["NormalsIndex"], vec3s),
            "LayerElementColor" => {
                builder.colors = Layer::read(child, "Colors", &["ColorsIndex", "ColorIndex"], rgb_from_rgba)
            }
            "LayerElementUV" if layer_index(child) == 0 => {
                builder.tex_coords = Layer::read(child, "UV", &["UVIndex"], tex_coords)
            }
            "LayerElementMaterial" => {
                if let Some(materials) = child.child("Materials") {
                    builder.materials = materials.int_vector();
                }
            }
            "LayerElementTexture" => {
                if let Some(textures) = child.child("TextureId") {
                    builder.textures = textures.int_vector();
                }
            }
            _ => {}
        }
    }
    builder.build()
}
