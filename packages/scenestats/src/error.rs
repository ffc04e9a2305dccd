//! Error types shared by the query and statistics layers.
//!
//! Classification and traversal failures are normally recovered where they
//! happen (logged and skipped). Everything else is surfaced to the caller
//! unmodified through [`SceneError`].

use thiserror::Error;

use crate::item::{ItemHandle, ItemKind};

/// Result alias used across the crate.
pub type SceneResult<T> = Result<T, SceneError>;

#[derive(Error, Debug)]
pub enum SceneError {
    /// A single kind test failed inside the engine.
    #[error("classification as {kind} failed: {reason}")]
    Classification { kind: ItemKind, reason: String },

    /// Converting a handle to a kind it was classified as still failed.
    #[error("conversion to {kind} failed: {reason}")]
    Conversion { kind: ItemKind, reason: String },

    /// A write-back was requested with no values.
    #[error("no measurement values to write")]
    EmptyInput,

    /// No target item (or no scene root) could be resolved.
    #[error("no target item")]
    NullTarget,

    /// The handle no longer refers to an item in the live scene.
    #[error("stale item handle {0}")]
    StaleHandle(ItemHandle),

    /// The target's factor set lacks a required dimension.
    #[error("factor '{0}' is not defined on this item")]
    MissingFactor(String),

    /// Parallel statistic arrays disagree in length.
    #[error("statistics column '{column}' has {actual} entries, expected {expected}")]
    ShapeMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Any other failure reported by the engine session.
    #[error("engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SceneError {
    /// Whether the error came from a per-kind classification test.
    pub fn is_classification(&self) -> bool {
        matches!(self, SceneError::Classification { .. })
    }

    /// Whether the error means the handle went away underneath us.
    pub fn is_stale(&self) -> bool {
        matches!(self, SceneError::StaleHandle(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SceneError::MissingFactor("Channel".to_string());
        assert_eq!(err.to_string(), "factor 'Channel' is not defined on this item");

        let err = SceneError::Conversion {
            kind: ItemKind::PointSet,
            reason: "proxy rejected".to_string(),
        };
        assert_eq!(err.to_string(), "conversion to PointSet failed: proxy rejected");
    }

    #[test]
    fn test_error_predicates() {
        assert!(SceneError::StaleHandle(ItemHandle(4)).is_stale());
        assert!(!SceneError::EmptyInput.is_stale());
        assert!(SceneError::Classification {
            kind: ItemKind::Camera,
            reason: String::new(),
        }
        .is_classification());
    }
}
