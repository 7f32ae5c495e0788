//! Armature Core - FBX ingestion for skinned, blend-shaped characters.
//!
//! This crate provides:
//!
//! - **Container parsing**: binary and text FBX into a generic node tree
//! - **Mapping files**: the `key = value` companion file and its typed view
//! - **Geometry assembly**: joints, meshes, skinning, blendshapes and
//!   per-joint collision shapes
//!
//! # Example
//!
//! ```ignore
//! use armature_core::fbx::load_fbx;
//!
//! let geometry = load_fbx("avatar.fbx", Some("avatar.fst"))?;
//! println!("Loaded {} joints, {} meshes",
//!     geometry.joints.len(),
//!     geometry.meshes.len());
//! ```

pub mod config;
pub mod fbx;
pub mod mapping;
pub mod mesh;
pub mod scene;
pub mod voxel;

// Re-export commonly used types
pub use config::{ImportConfig, ReadOptions, UnresolvedPolicy};
pub use fbx::{load_fbx, read_fbx, LoadError, ParseError};
pub use mapping::{parse_mapping, Mapping, MappingValue};
pub use mesh::{Blendshape, Cluster, Mesh, MeshPart};
pub use scene::{Attachment, Geometry, Joint, ShapeType};
