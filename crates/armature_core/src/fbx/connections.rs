//! Object connection graph.
//!
//! FBX stores the scene graph as a flat list of `C` (FBX 7) or `Connect`
//! (FBX 6) records under `Connections`, each linking a source object to the
//! target it hangs off. This module turns that list into adjacency lists in
//! both directions.

use std::collections::HashMap;

use super::types::Node;

/// Parent/child adjacency between object IDs.
///
/// Child lists keep the order in which the connections appeared in the
/// document. Parent lists run newest first, so a later connection of the same
/// object takes precedence.
#[derive(Clone, Debug, Default)]
pub struct ConnectionGraph {
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, Vec<String>>,
    diffuse_textures: HashMap<String, String>,
    bump_textures: HashMap<String, String>,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every connection record found under the document's
    /// `Connections` nodes.
    pub fn from_document(root: &Node) -> Self {
        let mut graph = Self::new();
        for connections in root.children_named("Connections") {
            for connection in &connections.children {
                if connection.name == "C" || connection.name == "Connect" {
                    graph.add_record(connection);
                }
            }
        }
        log::debug!(
            "Connection graph: {} parents, {} children",
            graph.children.len(),
            graph.parents.len()
        );
        graph
    }

    fn add_record(&mut self, connection: &Node) {
        let source = connection.id(1);
        let target = connection.id(2);

        if connection.property_is(0, "OP") {
            let kind = connection.string_at(3).to_lowercase();
            if kind.contains("diffuse") {
                self.diffuse_textures.insert(target.clone(), source.clone());
            } else if kind.contains("bump") {
                self.bump_textures.insert(target.clone(), source.clone());
            }
        }
        self.connect(source, target);
    }

    /// Record `child` as hanging off `parent`.
    pub fn connect(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        let child = child.into();
        let parent = parent.into();
        self.children.entry(parent.clone()).or_default().push(child.clone());
        self.parents.entry(child).or_default().insert(0, parent);
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parents(&self, id: &str) -> &[String] {
        self.parents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Most recently recorded parent of `id`.
    pub fn parent(&self, id: &str) -> Option<&str> {
        self.parents(id).first().map(String::as_str)
    }

    /// First recorded child of `id`.
    pub fn first_child(&self, id: &str) -> Option<&str> {
        self.children(id).first().map(String::as_str)
    }

    /// Texture connected to `material` as its diffuse map.
    pub fn diffuse_texture(&self, material: &str) -> Option<&str> {
        self.diffuse_textures.get(material).map(String::as_str)
    }

    /// Texture connected to `material` as its bump map.
    pub fn bump_texture(&self, material: &str) -> Option<&str> {
        self.bump_textures.get(material).map(String::as_str)
    }

    /// Move `child` from its current parent to `new_parent`.
    ///
    /// The new parent becomes the most recent one; any older parents are left
    /// untouched.
    pub fn reparent(&mut self, child: &str, new_parent: &str) {
        let parents = self.parents.entry(child.to_string()).or_default();
        if !parents.is_empty() {
            let old_parent = parents.remove(0);
            if let Some(siblings) = self.children.get_mut(&old_parent) {
                if let Some(position) = siblings.iter().position(|id| id == child) {
                    siblings.remove(position);
                }
            }
        }
        parents.insert(0, new_parent.to_string());

        let siblings = self.children.entry(new_parent.to_string()).or_default();
        if !siblings.iter().any(|id| id == child) {
            siblings.push(child.to_string());
        }
    }
}
