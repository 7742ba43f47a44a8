//! Subtree: the render target appliers mutate.
//!
//! A small index arena of nodes. Nodes carry a tag, string attributes,
//! text, and children; there is no layout, styling, or paint semantics.
//! Appliers write into it during render passes and post-render hooks (and
//! tests) read it back.

use std::collections::BTreeMap;

// =============================================================================
// Nodes
// =============================================================================

/// Handle to a node in one instance's subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

// =============================================================================
// Subtree
// =============================================================================

/// One instance's owned node tree.
///
/// Operations on stale or foreign ids are ignored (writes) or return
/// nothing (reads); the subtree never panics on bad handles.
#[derive(Debug)]
pub struct Subtree {
    nodes: Vec<Node>,
}

impl Subtree {
    /// Create a subtree holding only the host root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                tag: "host".to_string(),
                ..Node::default()
            }],
        }
    }

    /// The host root.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Allocate a detached element node.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.into(),
            ..Node::default()
        });
        id
    }

    /// Append `child` under `parent`, detaching it from any prior parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.contains(parent) || !self.contains(child) || parent == child {
            return;
        }
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Detach all of `parent`'s children, releasing the references.
    pub fn clear_children(&mut self, parent: NodeId) {
        if !self.contains(parent) {
            return;
        }
        let children = std::mem::take(&mut self.nodes[parent.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Children of `parent`, in insertion order.
    pub fn children(&self, parent: NodeId) -> &[NodeId] {
        self.nodes
            .get(parent.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// A node's tag.
    pub fn tag(&self, id: NodeId) -> &str {
        self.nodes.get(id.0).map(|node| node.tag.as_str()).unwrap_or("")
    }

    /// Set an attribute.
    pub fn set_attribute(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.attributes.insert(name.into(), value.into());
        }
    }

    /// Remove an attribute.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.attributes.remove(name);
        }
    }

    /// Read an attribute.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(id.0)
            .and_then(|node| node.attributes.get(name))
            .map(String::as_str)
    }

    /// Set a node's text content.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.text = text.into();
        }
    }

    /// A node's text content.
    pub fn text(&self, id: NodeId) -> &str {
        self.nodes.get(id.0).map(|node| node.text.as_str()).unwrap_or("")
    }

    /// Whether `id` refers to a node in this subtree.
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Total allocated nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != child);
        }
    }
}

impl Default for Subtree {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
