//! Blendshape channels mapped onto the facial target table.
//!
//! Each `Shape` geometry holds sparse deltas against its mesh's source
//! vertices. A channel name selects one or more target slots (with weights);
//! the deltas are remapped onto the deduplicated vertex buffer and summed into
//! those slots.

use std::collections::HashMap;

use armature_math::Vec3;

use super::extract::ExtractedMesh;
use super::types::{process_id, Node};

/// Target slots used when the mapping file does not rename them.
pub const DEFAULT_BLENDSHAPE_NAMES: [&str; 48] = [
    "EyeBlink_L",
    "EyeBlink_R",
    "EyeSquint_L",
    "EyeSquint_R",
    "EyeDown_L",
    "EyeDown_R",
    "EyeIn_L",
    "EyeIn_R",
    "EyeOpen_L",
    "EyeOpen_R",
    "EyeOut_L",
    "EyeOut_R",
    "EyeUp_L",
    "EyeUp_R",
    "BrowsD_L",
    "BrowsD_R",
    "BrowsU_C",
    "BrowsU_L",
    "BrowsU_R",
    "JawFwd",
    "JawLeft",
    "JawOpen",
    "JawChew",
    "JawRight",
    "MouthLeft",
    "MouthRight",
    "MouthFrown_L",
    "MouthFrown_R",
    "MouthSmile_L",
    "MouthSmile_R",
    "MouthDimple_L",
    "MouthDimple_R",
    "LipsStretch_L",
    "LipsStretch_R",
    "LipsUpperClose",
    "LipsLowerClose",
    "LipsUpperUp",
    "LipsLowerDown",
    "LipsUpperOpen",
    "LipsLowerOpen",
    "LipsFunnel",
    "LipsPucker",
    "ChinLowerRaise",
    "ChinUpperRaise",
    "Sneer",
    "Puff",
    "CheekSquint_L",
    "CheekSquint_R",
];

/// Sparse deltas of one `Shape` geometry, still in source vertex indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawShape {
    pub id: String,
    pub indices: Vec<i32>,
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

fn vec3s(values: &[f64]) -> Vec<Vec3> {
    values
        .chunks_exact(3)
        .map(|v| Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32))
        .collect()
}

/// Read a `Geometry` node of class `Shape`.
pub fn read_shape(object: &Node) -> RawShape {
    let mut shape = RawShape {
        id: object.id(0),
        ..Default::default()
    };
    for data in &object.children {
        match data.name.as_str() {
            "Indexes" => shape.indices = data.int_vector(),
            "Vertices" => shape.vertices = vec3s(&data.double_vector()),
            "Normals" => shape.normals = vec3s(&data.double_vector()),
            _ => {}
        }
    }
    shape
}

/// Channel name -> `(target slot, weight)` list.
#[derive(Clone, Debug, Default)]
pub struct BlendshapeTable {
    entries: HashMap<String, Vec<(usize, f32)>>,
}

impl BlendshapeTable {
    /// Build the table from the default names and the mapping's `bs`
    /// overrides (canonical name -> source channels).
    pub fn new(overrides: &HashMap<String, Vec<(String, f32)>>) -> Self {
        let mut entries: HashMap<String, Vec<(usize, f32)>> = HashMap::new();
        for (slot, canonical) in DEFAULT_BLENDSHAPE_NAMES.iter().enumerate() {
            match overrides.get(*canonical) {
                Some(sources) if !sources.is_empty() => {
                    for (source, weight) in sources {
                        entries.entry(source.clone()).or_default().push((slot, *weight));
                    }
                }
                _ => entries.entry(canonical.to_string()).or_default().push((slot, 1.0)),
            }
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> &[(usize, f32)] {
        self.entries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Targets of a `BlendShapeChannel` deformer.
    ///
    /// Names the table does not know are retried with everything after the
    /// last `.` (exporters often prefix the blendshape node name).
    pub fn channel_targets(&self, channel: &Node) -> Vec<(usize, f32)> {
        let name = channel.object_name(1);
        let name = process_id(&name);
        if self.contains(name) {
            return self.get(name).to_vec();
        }
        let suffix = name.rsplit('.').next().unwrap_or(name);
        self.get(suffix).to_vec()
    }
}

/// Merge `shape` into `extracted`'s blendshape slots.
///
/// Every delta is copied to each output vertex created from its source
/// vertex; an output vertex already present in a slot accumulates.
pub fn merge_shape(extracted: &mut ExtractedMesh, shape: &RawShape, targets: &[(usize, f32)]) {
    let ExtractedMesh {
        mesh,
        new_indices,
        blendshape_index_maps,
        ..
    } = extracted;

    for &(slot, weight) in targets {
        if mesh.blendshapes.len() <= slot {
            mesh.blendshapes.resize_with(slot + 1, Default::default);
        }
        if blendshape_index_maps.len() <= slot {
            blendshape_index_maps.resize_with(slot + 1, HashMap::new);
        }
        let blendshape = &mut mesh.blendshapes[slot];
        let index_map = &mut blendshape_index_maps[slot];

        for (i, &original) in shape.indices.iter().enumerate() {
            let Some(outputs) = usize::try_from(original).ok().and_then(|o| new_indices.get(&o)) else {
                continue;
            };
            let vertex = shape.vertices.get(i).copied().unwrap_or(Vec3::ZERO) * weight;
            let normal = shape.normals.get(i).copied().unwrap_or(Vec3::ZERO) * weight;

            for &output in outputs {
                match index_map.get(&output) {
                    Some(&position) => {
                        blendshape.vertices[position] += vertex;
                        blendshape.normals[position] += normal;
                    }
                    None => {
                        index_map.insert(output, blendshape.indices.len());
                        blendshape.indices.push(output);
                        blendshape.vertices.push(vertex);
                        blendshape.normals.push(normal);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fbx::types::Property;

    fn channel(name: &[u8]) -> Node {
        let mut node = Node::new("Deformer");
        node.properties.push(Property::I64(99));
        node.properties.push(Property::String(name.to_vec()));
        node.properties.push(Property::Text("BlendShapeChannel".into()));
        node
    }

    fn mesh_with_split_vertex() -> ExtractedMesh {
        let mut extracted = ExtractedMesh::default();
        extracted.new_indices.insert(0, vec![0, 3]);
        extracted.new_indices.insert(1, vec![1]);
        extracted.new_indices.insert(2, vec![2]);
        extracted
    }

    #[test]
    fn test_default_table() {
        let table = BlendshapeTable::new(&HashMap::new());
        assert_eq!(DEFAULT_BLENDSHAPE_NAMES.len(), 48);
        assert_eq!(table.get("EyeBlink_L"), [(0, 1.0)]);
        assert_eq!(table.get("JawOpen"), [(21, 1.0)]);
        assert_eq!(table.get("CheekSquint_R"), [(47, 1.0)]);
        assert!(table.get("Smile").is_empty());
    }

    #[test]
    fn test_overrides_replace_default_names() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "JawOpen".to_string(),
            vec![("mouth_open".to_string(), 0.7), ("jaw_drop".to_string(), 0.3)],
        );
        overrides.insert("Puff".to_string(), vec![("mouth_open".to_string(), 0.5)]);
        let table = BlendshapeTable::new(&overrides);

        assert!(!table.contains("JawOpen"));
        assert_eq!(table.get("mouth_open"), [(21, 0.7), (45, 0.5)]);
        assert_eq!(table.get("jaw_drop"), [(21, 0.3)]);
    }

    #[test]
    fn test_channel_name_resolution() {
        let table = BlendshapeTable::new(&HashMap::new());
        assert_eq!(table.channel_targets(&channel(b"JawOpen\0\x01SubDeformer")), [(21, 1.0)]);
        assert_eq!(table.channel_targets(&channel(b"head_blendshapes.Sneer")), [(44, 1.0)]);
        assert_eq!(table.channel_targets(&channel(b"SubDeformer::Puff")), [(45, 1.0)]);
        assert!(table.channel_targets(&channel(b"Unknown")).is_empty());
    }

    #[test]
    fn test_merge_follows_split_vertices() {
        let mut extracted = mesh_with_split_vertex();
        let shape = RawShape {
            id: "1".into(),
            indices: vec![0, 2, 7],
            vertices: vec![Vec3::X, Vec3::Y, Vec3::Z],
            normals: vec![Vec3::Z],
        };
        merge_shape(&mut extracted, &shape, &[(1, 0.5)]);

        let blendshapes = &extracted.mesh.blendshapes;
        assert_eq!(blendshapes.len(), 2);
        assert!(blendshapes[0].is_empty());
        assert_eq!(blendshapes[1].indices, vec![0, 3, 2]);
        assert_eq!(blendshapes[1].vertices[1], Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(blendshapes[1].normals[2], Vec3::ZERO);
    }

    #[test]
    fn test_merge_accumulates_weighted_shapes() {
        let mut extracted = mesh_with_split_vertex();
        let first = RawShape {
            indices: vec![1],
            vertices: vec![Vec3::X],
            normals: vec![Vec3::Y],
            ..Default::default()
        };
        let second = RawShape {
            indices: vec![1, 2],
            vertices: vec![Vec3::Y, Vec3::Z],
            normals: vec![Vec3::Y, Vec3::Y],
            ..Default::default()
        };
        merge_shape(&mut extracted, &first, &[(0, 0.7)]);
        merge_shape(&mut extracted, &second, &[(0, 0.3)]);

        let blendshape = &extracted.mesh.blendshapes[0];
        assert_eq!(blendshape.indices, vec![1, 2]);
        assert!((blendshape.vertices[0] - Vec3::new(0.7, 0.3, 0.0)).length() < 1e-6);
        assert!((blendshape.normals[0] - Vec3::Y).length() < 1e-6);
        assert!((blendshape.vertices[1] - Vec3::new(0.0, 0.0, 0.3)).length() < 1e-6);
    }
}
