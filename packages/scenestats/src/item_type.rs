//! Item kind registry: classification and conversion of opaque handles.
//!
//! Each entry pairs a kind with its engine-side test and cast. A failing test
//! counts as "not this kind" and is logged, so a single unsupported check
//! never aborts a scan over all kinds.

use crate::error::{SceneError, SceneResult};
use crate::item::{ItemHandle, ItemKind, TypedItem};
use crate::session::EngineSession;

/// Registry entry for one item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemType {
    kind: ItemKind,
}

impl ItemType {
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Run this kind's classification test, treating engine errors as `false`.
    pub fn test(&self, session: &dyn EngineSession, item: ItemHandle) -> bool {
        match session.is_kind(item, self.kind) {
            Ok(matches) => matches,
            Err(err) => {
                let err = SceneError::Classification {
                    kind: self.kind,
                    reason: err.to_string(),
                };
                log::warn!("Item {}: {}", item, err);
                false
            }
        }
    }

    /// Cast `item` to this kind through the engine.
    ///
    /// Does not re-run the classification test; see [`convert`] for the
    /// checked path.
    pub fn cast(&self, session: &dyn EngineSession, item: ItemHandle) -> SceneResult<TypedItem> {
        match session.cast(item, self.kind) {
            Ok(handle) => Ok(TypedItem::new(self.kind, handle)),
            Err(err @ SceneError::StaleHandle(_)) => Err(err),
            Err(err) => Err(SceneError::Conversion {
                kind: self.kind,
                reason: err.to_string(),
            }),
        }
    }
}

/// All registry entries, in classification order.
pub fn registry() -> impl Iterator<Item = ItemType> {
    ItemKind::ALL.into_iter().map(|kind| ItemType { kind })
}

/// Registry entry for a kind.
pub fn item_type(kind: ItemKind) -> ItemType {
    ItemType { kind }
}

/// Determine the kind of an opaque item, or `None` if no test passes.
///
/// Kind tests are expected to be mutually exclusive. If the engine reports
/// more than one, the first in registry order wins.
pub fn classify(session: &dyn EngineSession, item: ItemHandle) -> Option<ItemKind> {
    let mut matched: Option<ItemKind> = None;

    for entry in registry() {
        if !entry.test(session, item) {
            continue;
        }
        match matched {
            None => matched = Some(entry.kind()),
            Some(first) => {
                log::warn!(
                    "Item {} matches both {} and {}; keeping {}",
                    item,
                    first,
                    entry.kind(),
                    first
                );
            }
        }
    }

    matched
}

/// Convert an item to `kind`, failing unless it classifies as exactly that kind.
pub fn convert(session: &dyn EngineSession, item: ItemHandle, kind: ItemKind) -> SceneResult<TypedItem> {
    match classify(session, item) {
        Some(found) if found == kind => item_type(kind).cast(session, item),
        Some(found) => Err(SceneError::Conversion {
            kind,
            reason: format!("item {} is a {}", item, found),
        }),
        None => Err(SceneError::Conversion {
            kind,
            reason: format!("item {} has an unrecognized kind", item),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_session::{MemorySession, NodeSpec};

    fn session_with(kind: Option<ItemKind>) -> (MemorySession, ItemHandle) {
        let mut session = MemorySession::empty();
        let root = session.root().unwrap();
        let item = match kind {
            Some(kind) => session.add_item(root, NodeSpec::new("item", kind)).unwrap(),
            None => session
                .add_item(root, NodeSpec::unrecognized("item", "Filaments"))
                .unwrap(),
        };
        (session, item)
    }

    #[test]
    fn test_classify_each_kind() {
        for kind in ItemKind::ALL {
            let (session, item) = session_with(Some(kind));
            assert_eq!(classify(&session, item), Some(kind));
        }
    }

    #[test]
    fn test_classify_unrecognized() {
        let (session, item) = session_with(None);
        assert_eq!(classify(&session, item), None);
    }

    #[test]
    fn test_convert_checks_classification() {
        let (session, item) = session_with(Some(ItemKind::Region));

        let typed = convert(&session, item, ItemKind::Region).unwrap();
        assert_eq!(typed.kind(), ItemKind::Region);

        let err = convert(&session, item, ItemKind::PointSet).unwrap_err();
        assert!(matches!(err, SceneError::Conversion { kind: ItemKind::PointSet, .. }));
    }

    #[test]
    fn test_convert_unrecognized_fails() {
        let (session, item) = session_with(None);
        assert!(convert(&session, item, ItemKind::Volume).is_err());
    }

    #[test]
    fn test_stale_handle_classifies_as_none() {
        let (mut session, item) = session_with(Some(ItemKind::Camera));
        session.remove_item(item).unwrap();
        assert_eq!(classify(&session, item), None);

        let err = item_type(ItemKind::Camera).cast(&session, item).unwrap_err();
        assert!(err.is_stale());
    }
}
