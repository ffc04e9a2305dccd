pub mod error;
pub mod item;
pub mod item_type;
pub mod session;
pub mod statistics;

// Scene access
pub mod scene_graph;
pub mod memory_session;
pub mod item_query;

// Measurement filtering and write-back
pub mod stats_query;
pub mod stats_creator;
pub mod export;
pub mod job;

pub mod cli;

pub use error::{SceneError, SceneResult};
pub use item::{FoundItem, ItemHandle, ItemKind, TypedItem};
pub use item_query::{FailurePolicy, ItemQuery};
pub use memory_session::MemorySession;
pub use session::EngineSession;
pub use statistics::StatisticsTable;
pub use stats_creator::StatsCreator;
pub use stats_query::{ResultTable, StatsQuery};
