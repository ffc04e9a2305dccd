//! Reference engine session backed by an in-memory scene.
//!
//! A [`MemorySession`] is opened explicitly from a [`SceneSnapshot`] (usually
//! a JSON file) and closed explicitly, handing the final scene back so it can
//! be saved. Handles of removed items become stale: every call against them
//! fails with [`SceneError::StaleHandle`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SceneError, SceneResult};
use crate::item::{ItemHandle, ItemKind};
use crate::scene_graph::{NodeKind, SceneGraph, SceneNode};
use crate::session::EngineSession;
use crate::statistics::StatisticsTable;

fn default_version() -> u32 {
    1
}

fn default_kind() -> String {
    ItemKind::Group.display_name().to_string()
}

fn default_visible() -> bool {
    true
}

/// Serialized form of a whole scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    /// Schema version for future migrations.
    #[serde(default = "default_version")]
    pub version: u32,

    /// The root container.
    pub root: NodeSnapshot,
}

impl SceneSnapshot {
    /// Load a snapshot from a JSON file.
    pub fn from_file(path: &Path) -> SceneResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: &Path) -> SceneResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Serialized form of one node and its subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub name: String,

    /// Kind name; unknown names are kept and classify as nothing.
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default = "default_visible")]
    pub visible: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatisticsTable>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

/// Description of a node to add to a live session.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    name: String,
    kind: NodeKind,
    visible: bool,
    statistics: StatisticsTable,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Known(kind),
            visible: true,
            statistics: StatisticsTable::default(),
        }
    }

    /// A node whose kind this crate does not model.
    pub fn unrecognized(name: impl Into<String>, kind_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Unrecognized(kind_name.into()),
            visible: true,
            statistics: StatisticsTable::default(),
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn with_statistics(mut self, statistics: StatisticsTable) -> Self {
        self.statistics = statistics;
        self
    }

    fn into_node(self) -> SceneNode {
        let mut node = SceneNode::new(self.name, self.kind);
        node.visible = self.visible;
        node.statistics = self.statistics;
        node
    }
}

/// Engine session over an in-memory scene.
#[derive(Debug)]
pub struct MemorySession {
    scene: SceneGraph,
    writes: usize,
}

impl MemorySession {
    /// A session with an empty root container named "Scene".
    pub fn empty() -> Self {
        Self {
            scene: SceneGraph::new("Scene"),
            writes: 0,
        }
    }

    /// Open a session on a snapshot.
    pub fn open(snapshot: SceneSnapshot) -> SceneResult<Self> {
        let root_snapshot = snapshot.root;
        if !NodeKind::parse(&root_snapshot.kind).is_container() {
            return Err(SceneError::Engine(format!(
                "scene root '{}' must be a Group, not {}",
                root_snapshot.name, root_snapshot.kind
            )));
        }
        let mut scene = SceneGraph::new(root_snapshot.name.clone());
        let root = scene.root();
        if let Some(node) = scene.get_mut(root) {
            node.visible = root_snapshot.visible;
            node.statistics = root_snapshot.statistics.unwrap_or_default();
        }

        let mut pending: Vec<(ItemHandle, NodeSnapshot)> = root_snapshot
            .children
            .into_iter()
            .rev()
            .map(|child| (root, child))
            .collect();

        // Depth-first so handles are assigned in traversal order.
        while let Some((parent, snap)) = pending.pop() {
            let kind = NodeKind::parse(&snap.kind);
            if !snap.children.is_empty() && !kind.is_container() {
                return Err(SceneError::Engine(format!(
                    "item '{}' of kind {} cannot have children",
                    snap.name, snap.kind
                )));
            }

            let mut node = SceneNode::new(snap.name, kind);
            node.visible = snap.visible;
            node.statistics = snap.statistics.unwrap_or_default();

            let id = scene.insert(parent, node).ok_or_else(|| {
                SceneError::Engine(format!("cannot add children to non-container {}", parent))
            })?;
            pending.extend(snap.children.into_iter().rev().map(|child| (id, child)));
        }

        log::debug!("Opened scene '{}' with {} items", root_snapshot.name, scene.len());
        Ok(Self { scene, writes: 0 })
    }

    /// Open a session on a JSON snapshot file.
    pub fn from_file(path: &Path) -> SceneResult<Self> {
        Self::open(SceneSnapshot::from_file(path)?)
    }

    /// Tear the session down, returning the final state of the scene.
    pub fn close(self) -> SceneSnapshot {
        let snapshot = self.snapshot();
        log::debug!("Closed scene after {} write-backs", self.writes);
        snapshot
    }

    /// Current state of the scene.
    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            version: default_version(),
            root: self.node_snapshot(self.scene.root()),
        }
    }

    fn node_snapshot(&self, id: ItemHandle) -> NodeSnapshot {
        let Some(node) = self.scene.get(id) else {
            return NodeSnapshot {
                name: String::new(),
                kind: default_kind(),
                visible: false,
                statistics: None,
                children: Vec::new(),
            };
        };
        NodeSnapshot {
            name: node.name.clone(),
            kind: node.kind.name().to_string(),
            visible: node.visible,
            statistics: (!node.statistics.is_empty() || !node.statistics.factor_names().is_empty())
                .then(|| node.statistics.clone()),
            children: node.children().iter().map(|&c| self.node_snapshot(c)).collect(),
        }
    }

    /// Add an item as the last child of `parent`.
    pub fn add_item(&mut self, parent: ItemHandle, spec: NodeSpec) -> SceneResult<ItemHandle> {
        self.node(parent)?;
        self.scene.insert(parent, spec.into_node()).ok_or_else(|| {
            SceneError::Engine(format!("item {} is not a container", parent))
        })
    }

    /// Remove an item and everything below it.
    pub fn remove_item(&mut self, item: ItemHandle) -> SceneResult<()> {
        self.node(item)?;
        if self.scene.remove(item) == 0 {
            return Err(SceneError::Engine("the scene root cannot be removed".to_string()));
        }
        Ok(())
    }

    pub fn set_name(&mut self, item: ItemHandle, name: impl Into<String>) -> SceneResult<()> {
        self.node_mut(item)?.name = name.into();
        Ok(())
    }

    pub fn set_visible(&mut self, item: ItemHandle, visible: bool) -> SceneResult<()> {
        self.node_mut(item)?.visible = visible;
        Ok(())
    }

    /// Number of successful measurement write-backs so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn node(&self, item: ItemHandle) -> SceneResult<&SceneNode> {
        self.scene.get(item).ok_or(SceneError::StaleHandle(item))
    }

    fn node_mut(&mut self, item: ItemHandle) -> SceneResult<&mut SceneNode> {
        self.scene.get_mut(item).ok_or(SceneError::StaleHandle(item))
    }
}

impl EngineSession for MemorySession {
    fn root(&self) -> Option<ItemHandle> {
        Some(self.scene.root())
    }

    fn is_kind(&self, item: ItemHandle, kind: ItemKind) -> SceneResult<bool> {
        Ok(self.node(item)?.kind == NodeKind::Known(kind))
    }

    fn cast(&self, item: ItemHandle, kind: ItemKind) -> SceneResult<ItemHandle> {
        if self.is_kind(item, kind)? {
            Ok(item)
        } else {
            Err(SceneError::Engine(format!("item {} is not a {}", item, kind)))
        }
    }

    fn children(&self, container: ItemHandle) -> SceneResult<Vec<ItemHandle>> {
        Ok(self.node(container)?.children().to_vec())
    }

    fn name(&self, item: ItemHandle) -> SceneResult<String> {
        Ok(self.node(item)?.name.clone())
    }

    fn visible(&self, item: ItemHandle) -> SceneResult<bool> {
        Ok(self.node(item)?.visible)
    }

    fn measurements(&self, item: ItemHandle) -> SceneResult<StatisticsTable> {
        Ok(self.node(item)?.statistics.clone())
    }

    fn append_measurements(&mut self, item: ItemHandle, batch: &StatisticsTable) -> SceneResult<()> {
        self.node_mut(item)?.statistics.append(batch);
        self.writes += 1;
        Ok(())
    }
}
