//! In-memory scene tree backing [`crate::memory_session::MemorySession`].
//!
//! Nodes live in a flat map keyed by handle; containers keep an ordered list
//! of child handles. Insertion order is traversal order.

use std::collections::HashMap;

use crate::item::{ItemHandle, ItemKind};
use crate::statistics::StatisticsTable;

/// Kind of a node as stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Known(ItemKind),
    /// A kind the engine has but this crate does not model.
    Unrecognized(String),
}

impl NodeKind {
    /// Parse an engine kind name, keeping unknown names verbatim.
    pub fn parse(name: &str) -> Self {
        match name.parse::<ItemKind>() {
            Ok(kind) => NodeKind::Known(kind),
            Err(_) => NodeKind::Unrecognized(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeKind::Known(kind) => kind.display_name(),
            NodeKind::Unrecognized(name) => name,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, NodeKind::Known(kind) if kind.is_container())
    }
}

/// A single scene object.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    pub visible: bool,
    pub statistics: StatisticsTable,
    parent: Option<ItemHandle>,
    children: Vec<ItemHandle>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            visible: true,
            statistics: StatisticsTable::default(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<ItemHandle> {
        self.parent
    }

    pub fn children(&self) -> &[ItemHandle] {
        &self.children
    }
}

/// The scene tree.
#[derive(Debug)]
pub struct SceneGraph {
    nodes: HashMap<ItemHandle, SceneNode>,
    root: ItemHandle,
    next_id: u64,
}

impl SceneGraph {
    /// Create a tree holding only a root container.
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = ItemHandle(1);
        let mut nodes = HashMap::new();
        nodes.insert(root, SceneNode::new(root_name, NodeKind::Known(ItemKind::Group)));
        Self {
            nodes,
            root,
            next_id: 2,
        }
    }

    pub fn root(&self) -> ItemHandle {
        self.root
    }

    fn new_id(&mut self) -> ItemHandle {
        let id = ItemHandle(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert `node` as the last child of `parent`.
    /// Returns `None` if the parent does not exist or is not a container.
    pub fn insert(&mut self, parent: ItemHandle, mut node: SceneNode) -> Option<ItemHandle> {
        if !self.nodes.get(&parent)?.kind.is_container() {
            return None;
        }
        let id = self.new_id();
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.insert(id, node);
        self.nodes.get_mut(&parent)?.children.push(id);
        Some(id)
    }

    /// Remove a node and its whole subtree. The root cannot be removed.
    /// Returns the number of nodes removed.
    pub fn remove(&mut self, id: ItemHandle) -> usize {
        if id == self.root {
            return 0;
        }
        let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) else {
            return 0;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|&c| c != id);
        }

        let mut removed = 0;
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                pending.extend(node.children);
                removed += 1;
            }
        }
        removed
    }

    pub fn get(&self, id: ItemHandle) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: ItemHandle) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    pub fn exists(&self, id: ItemHandle) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
