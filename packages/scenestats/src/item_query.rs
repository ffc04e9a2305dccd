//! Finding items in the scene tree by name, kind and position.
//!
//! An [`ItemQuery`] is built once and can be run any number of times; every
//! run re-reads the live scene through the session, so results may change
//! between runs.
//!
//! Filter precedence: when a name is given it must match exactly, and the
//! kind is only checked if one was also given. Without a name the kind
//! filter applies on its own. With neither, everything in scope matches.
//! A name match with no kind filter is accepted even when the item's kind is
//! unrecognized.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{SceneError, SceneResult};
use crate::item::{FoundItem, ItemHandle, ItemKind, TypedItem};
use crate::item_type::{classify, item_type};
use crate::session::EngineSession;

/// What to do when an item that classified as a kind cannot be converted to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Keep the item unconverted and carry on.
    #[default]
    BestEffort,
    /// Abort the whole query.
    Strict,
}

/// An immutable item search request.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    parent: Option<ItemHandle>,
    name: Option<String>,
    kind: Option<ItemKind>,
    position: usize,
    recursive: bool,
    policy: FailurePolicy,
}

impl ItemQuery {
    pub fn builder() -> ItemQueryBuilder {
        ItemQueryBuilder::default()
    }

    /// Parent container; `None` means the scene root.
    pub fn parent(&self) -> Option<ItemHandle> {
        self.parent
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> Option<ItemKind> {
        self.kind
    }

    /// 1-based position. Not used by [`ItemQuery::find`]; see [`ItemQuery::find_at`].
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Whether an item with this name and kind passes the filters.
    pub fn accepts(&self, name: Option<&str>, kind: Option<ItemKind>) -> bool {
        match (self.name.as_deref(), self.kind) {
            (Some(wanted), wanted_kind) => {
                name == Some(wanted) && wanted_kind.map_or(true, |k| kind == Some(k))
            }
            (None, Some(wanted_kind)) => kind == Some(wanted_kind),
            (None, None) => true,
        }
    }

    /// Run the query against the live scene.
    ///
    /// Items come back in traversal order: each child, then (when recursive)
    /// that child's descendants, before the next sibling.
    pub fn find(&self, session: &dyn EngineSession) -> SceneResult<Vec<FoundItem>> {
        let parent = self.parent.or_else(|| session.root()).ok_or(SceneError::NullTarget)?;
        let children = session.children(parent)?;

        let mut visited = HashSet::from([parent]);
        let mut found = Vec::new();
        self.visit(session, children, &mut visited, &mut found)?;

        log::debug!(
            "Item query under {} (name={:?}, kind={:?}, recursive={}) matched {} items",
            parent,
            self.name,
            self.kind,
            self.recursive,
            found.len()
        );
        Ok(found)
    }

    /// First result, if any.
    pub fn find_first(&self, session: &dyn EngineSession) -> SceneResult<Option<FoundItem>> {
        Ok(self.find(session)?.into_iter().next())
    }

    /// Result at the query's 1-based position, if there are that many.
    pub fn find_at(&self, session: &dyn EngineSession) -> SceneResult<Option<FoundItem>> {
        Ok(self.find(session)?.into_iter().nth(self.position.saturating_sub(1)))
    }

    fn visit(
        &self,
        session: &dyn EngineSession,
        children: Vec<ItemHandle>,
        visited: &mut HashSet<ItemHandle>,
        found: &mut Vec<FoundItem>,
    ) -> SceneResult<()> {
        for child in children {
            if !visited.insert(child) {
                log::warn!("Item {} reached twice during traversal; skipping", child);
                continue;
            }

            let name = match session.name(child) {
                Ok(name) => Some(name),
                Err(err) if err.is_stale() => {
                    log::warn!("Item {} disappeared during traversal; skipping", child);
                    continue;
                }
                Err(err) => {
                    log::warn!("Could not read name of item {}: {}", child, err);
                    None
                }
            };
            let kind = classify(session, child);

            if self.accepts(name.as_deref(), kind) {
                let typed = self.resolve(session, child, kind)?;
                let visible = session.visible(child).unwrap_or_else(|err| {
                    log::warn!("Could not read visibility of item {}: {}", child, err);
                    false
                });
                found.push(FoundItem {
                    handle: child,
                    name: name.unwrap_or_default(),
                    visible,
                    typed,
                });
            } else {
                log::debug!("Item {} ({:?}, {:?}) filtered out", child, name, kind);
            }

            if self.recursive && kind.is_some_and(|k| k.is_container()) {
                match session.children(child) {
                    Ok(grandchildren) => self.visit(session, grandchildren, visited, found)?,
                    Err(err) => log::warn!("Could not list children of {}: {}", child, err),
                }
            }
        }
        Ok(())
    }

    fn resolve(
        &self,
        session: &dyn EngineSession,
        item: ItemHandle,
        kind: Option<ItemKind>,
    ) -> SceneResult<Option<TypedItem>> {
        let Some(kind) = kind else {
            return Ok(None);
        };
        match item_type(kind).cast(session, item) {
            Ok(typed) => Ok(Some(typed)),
            Err(err) if err.is_stale() => Err(err),
            Err(err) => match self.policy {
                FailurePolicy::Strict => Err(err),
                FailurePolicy::BestEffort => {
                    log::warn!("Keeping item {} unconverted: {}", item, err);
                    Ok(None)
                }
            },
        }
    }
}

/// Builder for [`ItemQuery`].
#[derive(Debug, Clone)]
pub struct ItemQueryBuilder {
    query: ItemQuery,
}

impl Default for ItemQueryBuilder {
    fn default() -> Self {
        Self {
            query: ItemQuery {
                parent: None,
                name: None,
                kind: None,
                position: 1,
                recursive: false,
                policy: FailurePolicy::default(),
            },
        }
    }
}

impl ItemQueryBuilder {
    pub fn parent(mut self, parent: ItemHandle) -> Self {
        self.query.parent = Some(parent);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.query.name = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: ItemKind) -> Self {
        self.query.kind = Some(kind);
        self
    }

    /// 1-based; zero is treated as one.
    pub fn position(mut self, position: usize) -> Self {
        self.query.position = position.max(1);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.query.recursive = recursive;
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.query.policy = policy;
        self
    }

    pub fn build(self) -> ItemQuery {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_session::{MemorySession, NodeSpec};

    /// Scene:
    /// - Cells (Region)
    /// - Group A
    ///   - Spots (PointSet)
    ///   - Group B
    ///     - Cells (Region)
    /// - Mystery (unrecognized)
    /// - Light 1 (Light)
    fn scene() -> MemorySession {
        let mut s = MemorySession::empty();
        let root = s.root().unwrap();
        s.add_item(root, NodeSpec::new("Cells", ItemKind::Region)).unwrap();
        let a = s.add_item(root, NodeSpec::new("Group A", ItemKind::Group)).unwrap();
        s.add_item(a, NodeSpec::new("Spots", ItemKind::PointSet)).unwrap();
        let b = s.add_item(a, NodeSpec::new("Group B", ItemKind::Group)).unwrap();
        s.add_item(b, NodeSpec::new("Cells", ItemKind::Region).hidden()).unwrap();
        s.add_item(root, NodeSpec::unrecognized("Mystery", "Filaments")).unwrap();
        s.add_item(root, NodeSpec::new("Light 1", ItemKind::Light)).unwrap();
        s
    }

    fn names(found: &[FoundItem]) -> Vec<&str> {
        found.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_no_filters_returns_direct_children() {
        let session = scene();
        let found = ItemQuery::builder().build().find(&session).unwrap();
        assert_eq!(names(&found), vec!["Cells", "Group A", "Mystery", "Light 1"]);
    }

    #[test]
    fn test_recursive_is_depth_first_parent_first() {
        let session = scene();
        let found = ItemQuery::builder().recursive(true).build().find(&session).unwrap();
        assert_eq!(
            names(&found),
            vec!["Cells", "Group A", "Spots", "Group B", "Cells", "Mystery", "Light 1"]
        );

        let handles: HashSet<_> = found.iter().map(|f| f.handle).collect();
        assert_eq!(handles.len(), found.len());
    }

    #[test]
    fn test_kind_filter() {
        let session = scene();
        let found = ItemQuery::builder()
            .kind(ItemKind::Region)
            .recursive(true)
            .build()
            .find(&session)
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|f| f.kind() == Some(ItemKind::Region)));
        assert!(found[0].visible);
        assert!(!found[1].visible);
    }

    #[test]
    fn test_name_and_kind_filters() {
        let session = scene();
        let query = ItemQuery::builder().name("Cells").kind(ItemKind::PointSet).build();
        assert!(query.find(&session).unwrap().is_empty());

        let query = ItemQuery::builder().name("Cells").kind(ItemKind::Region).build();
        assert_eq!(query.find(&session).unwrap().len(), 1);
    }

    #[test]
    fn test_name_match_accepts_unrecognized_kind() {
        let session = scene();
        let found = ItemQuery::builder().name("Mystery").build().find(&session).unwrap();
        assert_eq!(found.len(), 1);
        assert!(!found[0].is_resolved());
    }

    #[test]
    fn test_unfiltered_keeps_unrecognized_items_opaque() {
        let session = scene();
        let found = ItemQuery::builder().build().find(&session).unwrap();
        let mystery = found.iter().find(|f| f.name == "Mystery").unwrap();
        assert_eq!(mystery.kind(), None);
        assert_eq!(mystery.target(), mystery.handle);
    }

    #[test]
    fn test_parent_scopes_search() {
        let session = scene();
        let root = session.root().unwrap();
        let group_a = session.children(root).unwrap()[1];

        let found = ItemQuery::builder().parent(group_a).build().find(&session).unwrap();
        assert_eq!(names(&found), vec!["Spots", "Group B"]);
    }

    #[test]
    fn test_stale_parent_is_surfaced() {
        let mut session = scene();
        let root = session.root().unwrap();
        let group_a = session.children(root).unwrap()[1];
        session.remove_item(group_a).unwrap();

        let err = ItemQuery::builder().parent(group_a).build().find(&session).unwrap_err();
        assert!(err.is_stale());
    }

    #[test]
    fn test_find_at_uses_position() {
        let session = scene();
        let query = ItemQuery::builder().name("Cells").recursive(true).position(2).build();
        let second = query.find_at(&session).unwrap().unwrap();
        assert!(!second.visible);

        let query = ItemQuery::builder().name("Cells").position(5).build();
        assert!(query.find_at(&session).unwrap().is_none());
        assert_eq!(query.find(&session).unwrap().len(), 1);
    }

    #[test]
    fn test_accepts_precedence_table() {
        let any = ItemQuery::builder().build();
        assert!(any.accepts(None, None));

        let by_kind = ItemQuery::builder().kind(ItemKind::Camera).build();
        assert!(by_kind.accepts(Some("x"), Some(ItemKind::Camera)));
        assert!(!by_kind.accepts(Some("x"), None));

        let by_name = ItemQuery::builder().name("x").build();
        assert!(by_name.accepts(Some("x"), None));
        assert!(!by_name.accepts(None, Some(ItemKind::Camera)));

        let both = ItemQuery::builder().name("x").kind(ItemKind::Camera).build();
        assert!(both.accepts(Some("x"), Some(ItemKind::Camera)));
        assert!(!both.accepts(Some("x"), Some(ItemKind::Light)));
        assert!(!both.accepts(Some("y"), Some(ItemKind::Camera)));
    }

    #[test]
    fn test_builder_defaults() {
        let query = ItemQuery::builder().position(0).build();
        assert_eq!(query.position(), 1);
        assert!(!query.recursive());
        assert_eq!(query.policy(), FailurePolicy::BestEffort);
        assert!(query.parent().is_none());
    }
}
