//! Geometry for legacy voxel models.
//!
//! Older avatars shipped as sparse voxel octrees. Decoding the octree is done
//! elsewhere; this module takes the decoded leaf voxels and builds a single
//! rigid mesh with one quad per cube face.

use armature_math::{Vec3, EPSILON};
use serde::Serialize;

use crate::mesh::{Cluster, Mesh, MeshPart};
use crate::scene::{Geometry, Joint};

/// One decoded leaf voxel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Voxel {
    /// Minimum corner
    pub corner: Vec3,
    /// Edge length
    pub scale: f32,
    pub color: [u8; 3],
}

/// Face normals in emission order.
const FACE_NORMALS: [Vec3; 6] = [Vec3::NEG_X, Vec3::X, Vec3::NEG_Y, Vec3::Y, Vec3::NEG_Z, Vec3::Z];

/// Corner offsets (in units of the edge length) of each face, wound so the
/// quad faces outward.
const FACE_CORNERS: [[Vec3; 4]; 6] = [
    [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(0.0, 1.0, 1.0),
        Vec3::new(0.0, 1.0, 0.0),
    ],
    [
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.0, 0.0, 1.0),
    ],
    [
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(0.0, 0.0, 0.0),
    ],
    [
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.0, 1.0, 0.0),
    ],
    [
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 0.0),
    ],
    [
        Vec3::new(0.0, 0.0, 1.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(0.0, 1.0, 1.0),
    ],
];

/// Build a one-joint geometry from decoded voxels.
///
/// Every voxel contributes 24 vertices (4 per face, so each face keeps its
/// own normal) and 6 quads, coloured per vertex.
pub fn geometry_from_voxels(voxels: &[Voxel]) -> Geometry {
    let mut mesh = Mesh {
        vertices: Vec::with_capacity(voxels.len() * 24),
        normals: Vec::with_capacity(voxels.len() * 24),
        colors: Vec::with_capacity(voxels.len() * 24),
        ..Default::default()
    };
    let mut part = MeshPart::default();

    for voxel in voxels {
        if voxel.scale < EPSILON {
            log::debug!("Skipping voxel at {:?} with edge length {}", voxel.corner, voxel.scale);
            continue;
        }
        let color = Vec3::new(
            f32::from(voxel.color[0]),
            f32::from(voxel.color[1]),
            f32::from(voxel.color[2]),
        ) / 255.0;

        for (normal, corners) in FACE_NORMALS.iter().zip(&FACE_CORNERS) {
            for offset in corners {
                part.quad_indices.push(mesh.vertices.len() as u32);
                mesh.vertices.push(voxel.corner + *offset * voxel.scale);
                mesh.normals.push(*normal);
                mesh.colors.push(color);
            }
        }
    }

    mesh.parts.push(part);
    mesh.clusters.push(Cluster::identity(0));
    mesh.compute_extents(armature_math::Mat4::IDENTITY);

    let mut geometry = Geometry::default();
    geometry.mesh_extents = mesh.mesh_extents;
    geometry.joints.push(Joint {
        name: "voxel".to_string(),
        ..Default::default()
    });
    geometry.joint_indices.insert("voxel".to_string(), 0);
    geometry.meshes.push(mesh);

    log::debug!("Built voxel geometry with {} faces", geometry.meshes[0].quad_count());
    geometry
}
