//! Writing derived measurements back onto an item.
//!
//! A [`StatsCreator`] turns an `id -> value` mapping into the parallel-array
//! batch the engine's additive write-back expects, using the target item's
//! own factor ordering. Existing records are never touched.

use std::collections::BTreeMap;

use crate::error::{SceneError, SceneResult};
use crate::item::ItemHandle;
use crate::session::EngineSession;
use crate::statistics::{FactorIndex, StatisticsTable, FACTOR_CATEGORY, FACTOR_CHANNEL, FACTOR_TIME};
use crate::stats_query::{channel_tag, time_tag};

/// Timepoint used for every object without an explicit one (0-based).
pub const DEFAULT_TIMEPOINT: u32 = 0;

/// A pending batch of derived measurements for one item.
#[derive(Debug, Clone)]
pub struct StatsCreator {
    target: Option<ItemHandle>,
    name: String,
    values: BTreeMap<i64, f64>,
    channel: Option<u32>,
    category: Option<String>,
    default_timepoint: u32,
    timepoints: BTreeMap<i64, u32>,
    default_unit: String,
    units: BTreeMap<i64, String>,
}

impl StatsCreator {
    pub fn new(
        target: Option<ItemHandle>,
        name: impl Into<String>,
        values: impl IntoIterator<Item = (i64, f64)>,
    ) -> Self {
        Self {
            target,
            name: name.into(),
            values: values.into_iter().collect(),
            channel: None,
            category: None,
            default_timepoint: DEFAULT_TIMEPOINT,
            timepoints: BTreeMap::new(),
            default_unit: String::new(),
            units: BTreeMap::new(),
        }
    }

    pub fn for_item(
        target: ItemHandle,
        name: impl Into<String>,
        values: impl IntoIterator<Item = (i64, f64)>,
    ) -> Self {
        Self::new(Some(target), name, values)
    }

    /// Channel the values belong to, counting from 1.
    pub fn channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Timepoint (0-based) for objects without their own.
    pub fn default_timepoint(mut self, timepoint: u32) -> Self {
        self.default_timepoint = timepoint;
        self
    }

    /// Timepoint (0-based) of one object.
    pub fn timepoint(mut self, id: i64, timepoint: u32) -> Self {
        self.timepoints.insert(id, timepoint);
        self
    }

    pub fn timepoints(mut self, timepoints: impl IntoIterator<Item = (i64, u32)>) -> Self {
        self.timepoints.extend(timepoints);
        self
    }

    /// Unit for objects without their own.
    pub fn default_unit(mut self, unit: impl Into<String>) -> Self {
        self.default_unit = unit.into();
        self
    }

    pub fn unit(mut self, id: i64, unit: impl Into<String>) -> Self {
        self.units.insert(id, unit.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Lay the values out against the given factor ordering.
    ///
    /// Time is always tagged, so the factor set must define it. Channel and
    /// category are only required when set.
    pub fn build(&self, factor_names: &[String]) -> SceneResult<StatisticsTable> {
        if self.values.is_empty() {
            return Err(SceneError::EmptyInput);
        }

        let index = FactorIndex::new(factor_names);
        let time_col = index.resolve(FACTOR_TIME)?;
        let channel_col = match self.channel {
            Some(channel) => Some((index.resolve(FACTOR_CHANNEL)?, channel_tag(channel))),
            None => None,
        };
        let category_col = match &self.category {
            Some(category) => Some((index.resolve(FACTOR_CATEGORY)?, category.clone())),
            None => None,
        };

        let n = self.values.len();
        let mut names = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        let mut units = Vec::with_capacity(n);
        let mut ids = Vec::with_capacity(n);
        let mut factors = vec![Vec::with_capacity(n); factor_names.len()];

        for (&id, &value) in &self.values {
            names.push(self.name.clone());
            values.push(value as f32);
            units.push(self.units.get(&id).unwrap_or(&self.default_unit).clone());
            ids.push(id);

            let timepoint = self.timepoints.get(&id).copied().unwrap_or(self.default_timepoint);
            for (col, column) in factors.iter_mut().enumerate() {
                let tag = if col == time_col {
                    time_tag(timepoint)
                } else {
                    match (&channel_col, &category_col) {
                        (Some((c, tag)), _) if *c == col => tag.clone(),
                        (_, Some((c, tag))) if *c == col => tag.clone(),
                        _ => String::new(),
                    }
                };
                column.push(tag);
            }
        }

        StatisticsTable::new(factor_names.to_vec(), names, values, units, ids, factors)
    }

    /// Append the values to the target item through the session.
    ///
    /// The target's current table is read only for its factor ordering.
    /// Returns the number of records written.
    pub fn send(&self, session: &mut dyn EngineSession) -> SceneResult<usize> {
        let target = self.target.ok_or(SceneError::NullTarget)?;
        if self.values.is_empty() {
            return Err(SceneError::EmptyInput);
        }

        let factor_names = session.measurements(target)?.factor_names().to_vec();
        let batch = self.build(&factor_names)?;
        session.append_measurements(target, &batch)?;

        log::info!(
            "Wrote {} '{}' records to item {}",
            batch.len(),
            self.name,
            target
        );
        Ok(batch.len())
    }
}
