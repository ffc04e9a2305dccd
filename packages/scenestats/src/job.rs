//! Query and write-back job specifications.
//!
//! Jobs are JSON documents describing one complete run against a scene
//! snapshot: which item to resolve, which records to select, and where the
//! output goes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{SceneError, SceneResult};
use crate::export::{export_table, ExportMetadata, OutputFormat};
use crate::item::{FoundItem, ItemKind};
use crate::item_query::{FailurePolicy, ItemQuery};
use crate::memory_session::MemorySession;
use crate::session::EngineSession;
use crate::stats_creator::{StatsCreator, DEFAULT_TIMEPOINT};
use crate::stats_query::{ResultTable, StatsQuery};

fn default_position() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {} {:?}: {}", what, path, e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {} {:?}: {}", what, path, e))
}

/// Which item a job works on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSelector {
    /// Name of the group to search in. None means the scene root.
    #[serde(default)]
    pub parent: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Kind name, canonical or legacy (e.g. "Spots").
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub recursive: bool,

    /// 1-based position among the matches.
    #[serde(default = "default_position")]
    pub position: usize,
}

impl ItemSelector {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            recursive: true,
            position: default_position(),
            ..Default::default()
        }
    }

    pub fn parsed_kind(&self) -> Result<Option<ItemKind>, String> {
        self.kind.as_deref().map(str::parse).transpose()
    }

    pub fn validate(&self) -> Result<(), String> {
        self.parsed_kind()?;
        if self.position == 0 {
            return Err("Item position is 1-based and must be positive".to_string());
        }
        Ok(())
    }

    /// Build the item query, resolving the parent group by name if given.
    pub fn query(&self, session: &dyn EngineSession, policy: FailurePolicy) -> SceneResult<ItemQuery> {
        let kind = self.parsed_kind().map_err(SceneError::Engine)?;
        let mut builder = ItemQuery::builder()
            .recursive(self.recursive)
            .position(self.position)
            .policy(policy);

        if let Some(parent) = &self.parent {
            let group = ItemQuery::builder()
                .name(parent.clone())
                .kind(ItemKind::Group)
                .recursive(true)
                .policy(policy)
                .build()
                .find_first(session)?
                .ok_or(SceneError::NullTarget)?;
            builder = builder.parent(group.target());
        }
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(kind) = kind {
            builder = builder.kind(kind);
        }
        Ok(builder.build())
    }

    /// Resolve the selected item, failing with `NullTarget` if nothing matches.
    pub fn resolve(&self, session: &dyn EngineSession, policy: FailurePolicy) -> SceneResult<FoundItem> {
        self.query(session, policy)?
            .find_at(session)?
            .ok_or(SceneError::NullTarget)
    }
}

/// Which records a query job keeps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSelector {
    /// Record names or anchored patterns.
    #[serde(default)]
    pub names: Vec<String>,

    #[serde(default)]
    pub ids: Vec<i64>,

    /// Channels, counting from 1.
    #[serde(default)]
    pub channels: Vec<u32>,

    /// Timepoints, counting from 0.
    #[serde(default)]
    pub timepoints: Vec<u32>,

    #[serde(default)]
    pub categories: Vec<String>,
}

impl StatsSelector {
    pub fn validate(&self) -> Result<(), String> {
        if self.channels.contains(&0) {
            return Err("Channels are 1-based; 0 is not a valid channel".to_string());
        }
        Ok(())
    }

    pub fn query(&self) -> StatsQuery {
        let mut query = StatsQuery::new().select_ids(self.ids.iter().copied());
        for name in &self.names {
            query = query.select_name(name.clone());
        }
        for &channel in &self.channels {
            query = query.select_channel(channel);
        }
        for &timepoint in &self.timepoints {
            query = query.select_time(timepoint);
        }
        for category in &self.categories {
            query = query.select_category(category.clone());
        }
        query
    }
}

/// Specification of a statistics query run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryJobSpec {
    /// Scene snapshot (JSON) to open.
    pub scene_path: PathBuf,

    pub item: ItemSelector,

    #[serde(default)]
    pub stats: StatsSelector,

    /// Where to write the table. None means the caller prints it.
    #[serde(default)]
    pub output_path: Option<PathBuf>,

    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default)]
    pub policy: FailurePolicy,

    /// Whether to write a `.meta.json` sidecar next to the output.
    #[serde(default = "default_true")]
    pub write_metadata: bool,
}

impl QueryJobSpec {
    pub fn new(scene_path: PathBuf, item: ItemSelector) -> Self {
        Self {
            scene_path,
            item,
            stats: StatsSelector::default(),
            output_path: None,
            format: OutputFormat::default(),
            policy: FailurePolicy::default(),
            write_metadata: true,
        }
    }

    /// Load a job from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        read_json(path, "query job")
    }

    /// Validate the job specification.
    pub fn validate(&self) -> Result<(), String> {
        if !self.scene_path.exists() {
            return Err(format!("Scene file not found: {:?}", self.scene_path));
        }
        self.item.validate()?;
        self.stats.validate()
    }

    /// Open the scene, evaluate the query and write the output if requested.
    pub fn execute(&self) -> SceneResult<ResultTable> {
        let session = MemorySession::from_file(&self.scene_path)?;
        let item = self.item.resolve(&session, self.policy)?;
        let table = self.stats.query().evaluate_item(&session, item.target())?;
        session.close();

        if let Some(output) = &self.output_path {
            export_table(&table, self.format, output)?;
            if self.write_metadata {
                let meta = ExportMetadata::new(&self.scene_path, &item.name, self.format, &table)?;
                meta.save(&ExportMetadata::sidecar_path(output))?;
            }
        }
        Ok(table)
    }
}

/// Specification of a measurement write-back run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendJobSpec {
    /// Scene snapshot (JSON) to open.
    pub scene_path: PathBuf,

    pub item: ItemSelector,

    pub statistic_name: String,

    /// Object id to value.
    pub values: BTreeMap<i64, f64>,

    #[serde(default)]
    pub unit: Option<String>,

    /// Channel, counting from 1.
    #[serde(default)]
    pub channel: Option<u32>,

    #[serde(default)]
    pub category: Option<String>,

    /// Timepoint (0-based) for objects not listed in `timepoints`.
    #[serde(default)]
    pub timepoint: Option<u32>,

    #[serde(default)]
    pub timepoints: BTreeMap<i64, u32>,

    /// Where to save the modified scene. None overwrites `scene_path`.
    #[serde(default)]
    pub output_scene_path: Option<PathBuf>,
}

impl AppendJobSpec {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        read_json(path, "append job")
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.scene_path.exists() {
            return Err(format!("Scene file not found: {:?}", self.scene_path));
        }
        self.item.validate()?;
        if self.statistic_name.trim().is_empty() {
            return Err("Statistic name cannot be empty".to_string());
        }
        if self.values.is_empty() {
            return Err("Append job must contain at least one value".to_string());
        }
        if self.channel == Some(0) {
            return Err("Channels are 1-based; 0 is not a valid channel".to_string());
        }
        Ok(())
    }

    /// The creator this job describes, aimed at `target`.
    pub fn creator(&self, target: &FoundItem) -> StatsCreator {
        let mut creator = StatsCreator::for_item(
            target.target(),
            self.statistic_name.clone(),
            self.values.iter().map(|(&id, &v)| (id, v)),
        )
        .default_timepoint(self.timepoint.unwrap_or(DEFAULT_TIMEPOINT))
        .timepoints(self.timepoints.iter().map(|(&id, &t)| (id, t)));

        if let Some(unit) = &self.unit {
            creator = creator.default_unit(unit.clone());
        }
        if let Some(channel) = self.channel {
            creator = creator.channel(channel);
        }
        if let Some(category) = &self.category {
            creator = creator.category(category.clone());
        }
        creator
    }

    /// Effective path the modified scene is written to.
    pub fn effective_output_path(&self) -> PathBuf {
        self.output_scene_path
            .clone()
            .unwrap_or_else(|| self.scene_path.clone())
    }

    /// Open the scene, write the values back and save the result.
    /// Returns the number of records written.
    pub fn execute(&self) -> SceneResult<usize> {
        let mut session = MemorySession::from_file(&self.scene_path)?;
        let item = self.item.resolve(&session, FailurePolicy::Strict)?;
        let written = self.creator(&item).send(&mut session)?;
        session.close().save(&self.effective_output_path())?;
        Ok(written)
    }
}
