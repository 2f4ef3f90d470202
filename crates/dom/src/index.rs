//! A minimal DOM structure mirror for subtree queries.
//!
//! The index subscribes to `DOMUpdate` batches and keeps just enough of the tree
//! (parent links, child order and lowercase tag names) to answer "is this node
//! inside that subtree" for observers scoped to a root.

use crate::{DOMSubscriber, DOMUpdate, NodeKey};
use anyhow::Result;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Chain of nodes from a node up to the top of its tree, the node itself first.
pub type Ancestors = SmallVec<NodeKey, 16>;

/// Parent/child/tag mirror of the live DOM.
#[derive(Debug, Default, Clone)]
pub struct DomIndex {
    /// Map node -> current tag name (for elements), lowercase.
    tag_by_key: HashMap<NodeKey, String>,
    /// Parent -> children relation, in document order.
    children_by_parent: HashMap<NodeKey, Vec<NodeKey>>,
    /// Child -> parent relation.
    parent_by_child: HashMap<NodeKey, NodeKey>,
}

impl DomIndex {
    /// Create an empty index containing only the implicit document root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn link(&mut self, parent: NodeKey, node: NodeKey, pos: usize) {
        if let Some(previous) = self.parent_by_child.insert(node, parent) {
            if let Some(siblings) = self.children_by_parent.get_mut(&previous) {
                siblings.retain(|child| *child != node);
            }
        }
        let siblings = self.children_by_parent.entry(parent).or_default();
        siblings.retain(|child| *child != node);
        let at = pos.min(siblings.len());
        siblings.insert(at, node);
    }

    /// Remove a node (and its descendants) from the index.
    fn remove_recursively(&mut self, node: NodeKey) {
        if let Some(children) = self.children_by_parent.remove(&node) {
            for child in children {
                self.remove_recursively(child);
            }
        }
        if let Some(parent) = self.parent_by_child.remove(&node) {
            if let Some(siblings) = self.children_by_parent.get_mut(&parent) {
                siblings.retain(|child| *child != node);
            }
        }
        self.tag_by_key.remove(&node);
    }

    /// Lowercase tag name of an element node.
    #[must_use]
    pub fn tag_of(&self, node: NodeKey) -> Option<&str> {
        self.tag_by_key.get(&node).map(String::as_str)
    }

    /// Parent of a node, if it is attached.
    #[must_use]
    pub fn parent_of(&self, node: NodeKey) -> Option<NodeKey> {
        self.parent_by_child.get(&node).copied()
    }

    /// Children of a node in document order.
    #[must_use]
    pub fn children_of(&self, node: NodeKey) -> &[NodeKey] {
        self.children_by_parent
            .get(&node)
            .map_or(&[], Vec::as_slice)
    }

    /// Walk from `node` to the top of its tree.
    #[must_use]
    pub fn ancestors(&self, node: NodeKey) -> Ancestors {
        let mut chain = Ancestors::new();
        chain.push(node);
        let mut current = node;
        // Bounded by the number of links so a corrupt update stream cannot loop forever.
        for _ in 0..=self.parent_by_child.len() {
            let Some(parent) = self.parent_of(current) else {
                break;
            };
            if chain.contains(&parent) {
                log::warn!("DomIndex: parent cycle detected at {parent:?}");
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Whether `node` lies inside the subtree rooted at `root` (inclusive).
    #[must_use]
    pub fn contains(&self, root: NodeKey, node: NodeKey) -> bool {
        root == NodeKey::ROOT || self.ancestors(node).contains(&root)
    }

    /// Number of attached nodes (excluding the implicit root).
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent_by_child.len()
    }

    /// Whether nothing has been attached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent_by_child.is_empty()
    }
}

impl DOMSubscriber for DomIndex {
    /// Apply a DOM update to keep the structure current.
    fn apply_update(&mut self, update: DOMUpdate) -> Result<()> {
        match update {
            DOMUpdate::InsertElement {
                parent,
                node,
                tag,
                pos,
            } => {
                self.link(parent, node, pos);
                self.tag_by_key.insert(node, tag.to_ascii_lowercase());
            }
            DOMUpdate::InsertText {
                parent, node, pos, ..
            } => {
                self.link(parent, node, pos);
            }
            DOMUpdate::RemoveNode { node } => {
                self.remove_recursively(node);
            }
            DOMUpdate::SetAttr { .. } | DOMUpdate::EndOfDocument => {}
        }
        Ok(())
    }
}
