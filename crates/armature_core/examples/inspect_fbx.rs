//! Example: Load and inspect an FBX avatar.
//!
//! Run with: cargo run --example inspect_fbx -- avatar.fbx [avatar.fst] [--json]

use std::env;

use anyhow::Context;
use armature_core::fbx::load_fbx;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|arg| arg == "--json");
    let paths: Vec<&String> = args.iter().filter(|arg| !arg.starts_with("--")).collect();

    let Some(model_path) = paths.first() else {
        println!("Usage: inspect_fbx <model.fbx> [mapping.fst] [--json]");
        println!("\nExamples:");
        println!("  cargo run --example inspect_fbx -- avatar.fbx");
        println!("  cargo run --example inspect_fbx -- avatar.fbx avatar.fst --json");
        return Ok(());
    };
    let mapping_path = paths.get(1).map(|path| path.as_str());

    let geometry = load_fbx(model_path.as_str(), mapping_path)
        .with_context(|| format!("failed to load {}", model_path))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&geometry)?);
        return Ok(());
    }

    println!("\n=== {} ===", model_path);
    println!("Joints: {}", geometry.joints.len());
    println!("Meshes: {}", geometry.meshes.len());
    println!("Vertices: {}", geometry.vertex_count());
    println!("Blendshapes: {}", geometry.has_blendshapes());

    println!("\n--- Joints ---");
    for (index, joint) in geometry.joints.iter().enumerate() {
        let position = joint.position();
        let parent = joint
            .parent_index
            .map(|parent| parent.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{}] {} (parent {}) at ({:.2}, {:.2}, {:.2}) {:?} r={:.3}{}",
            index,
            joint.name,
            parent,
            position.x,
            position.y,
            position.z,
            joint.shape_type,
            joint.bone_radius,
            if joint.is_free { " free" } else { "" }
        );
    }

    println!("\n--- Meshes ---");
    for (index, mesh) in geometry.meshes.iter().enumerate() {
        println!(
            "  [{}] {} vertices, {} triangles, {} quads, {} parts, {} clusters{}",
            index,
            mesh.vertex_count(),
            mesh.triangle_count(),
            mesh.quad_count(),
            mesh.parts.len(),
            mesh.clusters.len(),
            if mesh.is_eye { ", eye" } else { "" }
        );
        for part in &mesh.parts {
            if let Some(filename) = &part.diffuse_filename {
                println!("       diffuse: {}", filename);
            }
            if let Some(filename) = &part.normal_filename {
                println!("       normal: {}", filename);
            }
        }
    }

    let extents = geometry.mesh_extents;
    println!("\n--- Mesh Extents ---");
    println!(
        "  Min: ({:.2}, {:.2}, {:.2})",
        extents.minimum.x, extents.minimum.y, extents.minimum.z
    );
    println!(
        "  Max: ({:.2}, {:.2}, {:.2})",
        extents.maximum.x, extents.maximum.y, extents.maximum.z
    );

    if !geometry.unresolved.is_empty() {
        println!("\n--- Unresolved ---");
        for reference in &geometry.unresolved {
            println!("  {}", reference);
        }
    }
    Ok(())
}
