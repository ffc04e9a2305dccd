//! The engine session contract.
//!
//! Everything the query and statistics layers know about the analysis engine
//! goes through [`EngineSession`]. Calls are synchronous and may block for as
//! long as the engine takes. Implementations are not required to be
//! thread-safe; callers serialize access themselves.

use crate::error::SceneResult;
use crate::item::{ItemHandle, ItemKind};
use crate::statistics::StatisticsTable;

pub trait EngineSession {
    /// The scene root container, or `None` when no scene is loaded.
    fn root(&self) -> Option<ItemHandle>;

    /// Whether `item` is of the given kind.
    fn is_kind(&self, item: ItemHandle, kind: ItemKind) -> SceneResult<bool>;

    /// Produce a handle usable as the given kind.
    fn cast(&self, item: ItemHandle, kind: ItemKind) -> SceneResult<ItemHandle>;

    /// Direct children of a container, in engine order.
    fn children(&self, container: ItemHandle) -> SceneResult<Vec<ItemHandle>>;

    /// Display name of an item.
    fn name(&self, item: ItemHandle) -> SceneResult<String>;

    /// Visibility flag of an item.
    fn visible(&self, item: ItemHandle) -> SceneResult<bool>;

    /// Snapshot of the item's measurement records.
    fn measurements(&self, item: ItemHandle) -> SceneResult<StatisticsTable>;

    /// Add records to the item's measurements. Never replaces existing ones.
    fn append_measurements(&mut self, item: ItemHandle, batch: &StatisticsTable) -> SceneResult<()>;
}
