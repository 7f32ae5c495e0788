//! FBX support for Armature.
//!
//! This module parses FBX documents (binary and text) and converts them
//! to the [`Geometry`](crate::scene::Geometry) representation.
//!
//! ## Supported Features
//!
//! - Binary documents up to version 7.5 (64-bit record headers), with
//!   zlib-compressed arrays
//! - Text documents (FBX 6 and FBX 7 ASCII array layout)
//! - Model hierarchies with pivots, pre/post rotations and rotation limits
//! - Meshes split into parts by material and texture layer
//! - Skin clusters (up to four influences per vertex)
//! - Blendshape channels mapped onto a fixed facial target table
//!
//! ## Not Supported
//!
//! - Animation curves
//! - Lights and cameras
//! - Writing FBX
//!
//! # Example
//!
//! ```ignore
//! use armature_core::fbx::read_fbx;
//!
//! let geometry = read_fbx(&model_bytes, &mapping_bytes)?;
//! println!("Loaded {} joints", geometry.joints.len());
//! ```

mod blendshape;
mod codec;
mod collision;
mod connections;
mod extract;
mod hierarchy;
mod loader;
mod parser;
mod skin;
mod text;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use blendshape::DEFAULT_BLENDSHAPE_NAMES;
pub use codec::read_property;
pub use connections::ConnectionGraph;
pub use extract::{extract_mesh, ExtractedMesh};
pub use loader::*;
pub use parser::*;
pub use text::parse_text;
pub use types::*;
