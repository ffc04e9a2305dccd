//! Filtering measurement tables into flat result tables.
//!
//! Selections accumulate per dimension: values within one dimension are
//! alternatives (OR), dimensions combine with AND. An empty dimension does
//! not filter. Matching records are merged into one row per
//! `(object id, channel)` pair, with a column per statistic name. Key and
//! factor columns step aside (`Time (factor)`) when a statistic shares their
//! name.

use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::error::SceneResult;
use crate::item::ItemHandle;
use crate::session::EngineSession;
use crate::statistics::{
    StatisticRecord, StatisticsTable, FACTOR_CATEGORY, FACTOR_CHANNEL, FACTOR_TIME,
};

pub const COLUMN_ID: &str = "ID";
pub const COLUMN_CHANNEL: &str = "Channel";
pub const COLUMN_CATEGORY: &str = "Category";
pub const COLUMN_TIME: &str = "Time";

/// Store a 1-based caller channel number as a factor tag.
pub fn channel_tag(channel: u32) -> String {
    channel.to_string()
}

/// Store a 0-based caller timepoint as a factor tag (the engine counts from 1).
pub fn time_tag(timepoint: u32) -> String {
    (u64::from(timepoint) + 1).to_string()
}

/// A record-name selector: exact text, or an anchored regular expression.
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    regex: Option<Regex>,
}

impl NamePattern {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let regex = match Regex::new(&format!("^(?:{})$", raw)) {
            Ok(regex) => Some(regex),
            Err(err) => {
                log::debug!("Name selector {:?} is not a valid pattern, matching exactly: {}", raw, err);
                None
            }
        };
        Self { raw, regex }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, name: &str) -> bool {
        name == self.raw || self.regex.as_ref().is_some_and(|r| r.is_match(name))
    }
}

/// One cell of a result table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    /// Numeric-looking tags become numbers, everything else stays text.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Text(tag.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(_) => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// One merged row: all matched statistics of one object in one channel.
#[derive(Debug, Clone)]
pub struct ResultRow {
    id: i64,
    channel: String,
    cells: HashMap<String, Cell>,
}

impl ResultRow {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Raw channel tag of this row (empty for channel-independent statistics).
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }
}

/// Flat, export-ready result of a [`StatsQuery`].
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Column names in display order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row for an object and channel tag.
    pub fn row(&self, id: i64, channel: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.id == id && r.channel == channel)
    }

    /// `(id, value)` for every row holding a numeric value in `column`.
    pub fn column_values(&self, column: &str) -> Vec<(i64, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.get(column).and_then(Cell::as_f64).map(|v| (r.id, v)))
            .collect()
    }

    fn add_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ordered: BTreeMap<&String, &Cell> = self.cells.iter().collect();
        let mut map = serializer.serialize_map(Some(ordered.len()))?;
        for (column, cell) in ordered {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("columns", &self.columns)?;
        map.serialize_entry("rows", &self.rows)?;
        map.end()
    }
}

fn tag(column: Option<usize>, rec: &StatisticRecord<'_>) -> String {
    column.map(|c| rec.factor(c).to_string()).unwrap_or_default()
}

/// Header for a key or factor column. A statistic with the same name keeps
/// the bare name, so the factor column is suffixed instead.
fn factor_column(base: &str, statistic_names: &BTreeSet<&str>) -> String {
    if statistic_names.contains(base) {
        format!("{} (factor)", base)
    } else {
        base.to_string()
    }
}

/// Accumulated record selection over a [`StatisticsTable`].
#[derive(Debug, Clone, Default)]
pub struct StatsQuery {
    ids: BTreeSet<i64>,
    names: Vec<NamePattern>,
    factors: BTreeMap<String, BTreeSet<String>>,
}

impl StatsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_id(mut self, id: i64) -> Self {
        self.ids.insert(id);
        self
    }

    pub fn select_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.ids.extend(ids);
        self
    }

    /// Select records by name, exactly or by anchored regular expression.
    pub fn select_name(mut self, pattern: impl Into<String>) -> Self {
        self.names.push(NamePattern::new(pattern));
        self
    }

    /// Select a channel, counting from 1.
    pub fn select_channel(self, channel: u32) -> Self {
        self.select_factor(FACTOR_CHANNEL, channel_tag(channel))
    }

    /// Select a timepoint, counting from 0.
    pub fn select_time(self, timepoint: u32) -> Self {
        self.select_factor(FACTOR_TIME, time_tag(timepoint))
    }

    pub fn select_category(self, category: impl Into<String>) -> Self {
        self.select_factor(FACTOR_CATEGORY, category)
    }

    /// Select a raw tag value of any factor.
    pub fn select_factor(mut self, factor: impl Into<String>, value: impl Into<String>) -> Self {
        self.factors.entry(factor.into()).or_default().insert(value.into());
        self
    }

    /// Whether no selection has been made.
    pub fn is_unfiltered(&self) -> bool {
        self.ids.is_empty() && self.names.is_empty() && self.factors.is_empty()
    }

    /// Indices of the records passing every selection.
    ///
    /// Fails with `MissingFactor` if a factor was selected that the table
    /// does not define.
    pub fn matching_indices(&self, table: &StatisticsTable) -> SceneResult<Vec<usize>> {
        let index = table.factor_index();
        let factor_filters = self
            .factors
            .iter()
            .map(|(factor, values)| Ok((index.resolve(factor)?, values)))
            .collect::<SceneResult<Vec<_>>>()?;

        let matched = table
            .records()
            .filter(|rec| self.names.is_empty() || self.names.iter().any(|p| p.matches(rec.name())))
            .filter(|rec| self.ids.is_empty() || self.ids.contains(&rec.id()))
            .filter(|rec| {
                factor_filters
                    .iter()
                    .all(|(column, values)| values.contains(rec.factor(*column)))
            })
            .map(|rec| rec.index())
            .collect();
        Ok(matched)
    }

    /// Filter `table` and merge the matches into rows keyed by `(id, channel)`.
    pub fn evaluate(&self, table: &StatisticsTable) -> SceneResult<ResultTable> {
        let matched = self.matching_indices(table)?;

        let index = table.factor_index();
        let channel_col = index.get(FACTOR_CHANNEL);
        let time_col = index.get(FACTOR_TIME);
        let category_col = index.get(FACTOR_CATEGORY);

        let statistic_names: BTreeSet<&str> = matched
            .iter()
            .filter_map(|&i| table.record(i))
            .map(|rec| rec.name())
            .collect();
        let id_column = factor_column(COLUMN_ID, &statistic_names);
        let channel_column = factor_column(COLUMN_CHANNEL, &statistic_names);
        let category_column = factor_column(COLUMN_CATEGORY, &statistic_names);
        let time_column = factor_column(COLUMN_TIME, &statistic_names);

        let mut result = ResultTable::default();
        result.add_column(&id_column);
        result.add_column(&channel_column);
        let mut row_of: HashMap<(i64, String), usize> = HashMap::new();

        for i in matched {
            let Some(rec) = table.record(i) else { continue };
            let channel = tag(channel_col, &rec);
            let key = (rec.id(), channel.clone());

            let row_index = *row_of.entry(key).or_insert_with(|| {
                let mut cells = HashMap::new();
                cells.insert(id_column.clone(), Cell::Number(rec.id() as f64));
                if !channel.is_empty() {
                    cells.insert(channel_column.clone(), Cell::from_tag(&channel));
                }
                result.rows.push(ResultRow {
                    id: rec.id(),
                    channel: channel.clone(),
                    cells,
                });
                result.rows.len() - 1
            });

            let mut updates = vec![(rec.name().to_string(), Cell::Number(f64::from(rec.value())))];
            let category = tag(category_col, &rec);
            if !category.is_empty() {
                updates.push((category_column.clone(), Cell::from_tag(&category)));
            }
            let time = tag(time_col, &rec);
            if !time.is_empty() {
                updates.push((time_column.clone(), Cell::from_tag(&time)));
            }

            for (column, cell) in updates {
                result.add_column(&column);
                result.rows[row_index].cells.insert(column, cell);
            }
        }

        log::debug!(
            "Stats query matched {} rows over {} columns",
            result.len(),
            result.columns.len()
        );
        Ok(result)
    }

    /// Read the item's measurements through the session and evaluate them.
    pub fn evaluate_item(&self, session: &dyn EngineSession, item: ItemHandle) -> SceneResult<ResultTable> {
        let table = session.measurements(item)?;
        self.evaluate(&table)
    }
}
