//! Measurement tables pulled from the engine.
//!
//! A [`StatisticsTable`] is the engine's parallel-array layout: one entry per
//! record in each of `names`, `values`, `units` and `ids`, plus one column per
//! factor. All columns always have the same length; constructors reject
//! anything else.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{SceneError, SceneResult};

pub const FACTOR_CHANNEL: &str = "Channel";
pub const FACTOR_TIME: &str = "Time";
pub const FACTOR_CATEGORY: &str = "Category";

/// Raw column layout, as exchanged with the engine and stored in snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsColumns {
    #[serde(default)]
    pub factor_names: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub values: Vec<f32>,
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub ids: Vec<i64>,
    /// One column per factor name, each as long as `names`.
    #[serde(default)]
    pub factors: Vec<Vec<String>>,
}

/// Validated snapshot of one item's measurement records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StatisticsColumns", into = "StatisticsColumns")]
pub struct StatisticsTable {
    columns: StatisticsColumns,
}

impl TryFrom<StatisticsColumns> for StatisticsTable {
    type Error = SceneError;

    fn try_from(columns: StatisticsColumns) -> Result<Self, Self::Error> {
        check_shape(&columns)?;
        Ok(Self { columns })
    }
}

impl From<StatisticsTable> for StatisticsColumns {
    fn from(table: StatisticsTable) -> Self {
        table.columns
    }
}

fn check_len(column: &str, expected: usize, actual: usize) -> SceneResult<()> {
    if expected != actual {
        return Err(SceneError::ShapeMismatch {
            column: column.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_shape(columns: &StatisticsColumns) -> SceneResult<()> {
    let n = columns.names.len();
    check_len("values", n, columns.values.len())?;
    check_len("units", n, columns.units.len())?;
    check_len("ids", n, columns.ids.len())?;
    check_len("factors", columns.factor_names.len(), columns.factors.len())?;
    for (name, column) in columns.factor_names.iter().zip(&columns.factors) {
        check_len(name, n, column.len())?;
    }
    Ok(())
}

impl StatisticsTable {
    /// Build a table from parallel columns, checking their lengths.
    pub fn new(
        factor_names: Vec<String>,
        names: Vec<String>,
        values: Vec<f32>,
        units: Vec<String>,
        ids: Vec<i64>,
        factors: Vec<Vec<String>>,
    ) -> SceneResult<Self> {
        Self::try_from(StatisticsColumns {
            factor_names,
            names,
            values,
            units,
            ids,
            factors,
        })
    }

    /// A table with the given factors and no records.
    pub fn empty(factor_names: Vec<String>) -> Self {
        let factors = vec![Vec::new(); factor_names.len()];
        Self {
            columns: StatisticsColumns {
                factor_names,
                factors,
                ..Default::default()
            },
        }
    }

    pub fn len(&self) -> usize {
        self.columns.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.names.is_empty()
    }

    pub fn factor_names(&self) -> &[String] {
        &self.columns.factor_names
    }

    pub fn names(&self) -> &[String] {
        &self.columns.names
    }

    pub fn values(&self) -> &[f32] {
        &self.columns.values
    }

    pub fn units(&self) -> &[String] {
        &self.columns.units
    }

    pub fn ids(&self) -> &[i64] {
        &self.columns.ids
    }

    /// Tags of one factor column, by position in `factor_names`.
    pub fn factor_column(&self, index: usize) -> Option<&[String]> {
        self.columns.factors.get(index).map(Vec::as_slice)
    }

    /// Resolve factor names to column positions for this snapshot.
    pub fn factor_index(&self) -> FactorIndex {
        FactorIndex::new(&self.columns.factor_names)
    }

    /// View of record `index`.
    pub fn record(&self, index: usize) -> Option<StatisticRecord<'_>> {
        (index < self.len()).then_some(StatisticRecord { table: self, index })
    }

    /// All records in table order.
    pub fn records(&self) -> impl Iterator<Item = StatisticRecord<'_>> {
        (0..self.len()).map(move |index| StatisticRecord { table: self, index })
    }

    /// Distinct record names, sorted.
    pub fn distinct_names(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.columns.names.iter().map(String::as_str).collect();
        set.into_iter().collect()
    }

    /// Distinct object identifiers, sorted.
    pub fn distinct_ids(&self) -> Vec<i64> {
        let set: BTreeSet<i64> = self.columns.ids.iter().copied().collect();
        set.into_iter().collect()
    }

    /// Distinct non-empty tags used in a factor column, sorted.
    pub fn factor_values(&self, factor: &str) -> SceneResult<Vec<&str>> {
        let index = self.factor_index().resolve(factor)?;
        let set: BTreeSet<&str> = self.columns.factors[index]
            .iter()
            .map(String::as_str)
            .filter(|tag| !tag.is_empty())
            .collect();
        Ok(set.into_iter().collect())
    }

    /// Summary of the values of all records called `name`.
    pub fn summary(&self, name: &str) -> ValueSummary {
        let samples: Vec<f32> = self
            .records()
            .filter(|r| r.name() == name)
            .map(|r| r.value())
            .collect();
        ValueSummary::from_samples(&samples)
    }

    /// Append another table's records, aligning factor columns by name.
    ///
    /// Factors only present in `other` are added to this table, with empty
    /// tags for the records already here.
    pub fn append(&mut self, other: &StatisticsTable) {
        let existing = self.len();
        let cols = &mut self.columns;

        for name in &other.columns.factor_names {
            if !cols.factor_names.contains(name) {
                cols.factor_names.push(name.clone());
                cols.factors.push(vec![String::new(); existing]);
            }
        }

        cols.names.extend(other.columns.names.iter().cloned());
        cols.values.extend_from_slice(&other.columns.values);
        cols.units.extend(other.columns.units.iter().cloned());
        cols.ids.extend_from_slice(&other.columns.ids);

        let incoming = other.factor_index();
        for (name, column) in cols.factor_names.iter().zip(cols.factors.iter_mut()) {
            match incoming.get(name) {
                Some(i) => column.extend(other.columns.factors[i].iter().cloned()),
                None => column.extend(std::iter::repeat(String::new()).take(other.len())),
            }
        }
    }
}

/// One row of a [`StatisticsTable`].
#[derive(Debug, Clone, Copy)]
pub struct StatisticRecord<'a> {
    table: &'a StatisticsTable,
    index: usize,
}

impl<'a> StatisticRecord<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'a str {
        &self.table.columns.names[self.index]
    }

    pub fn value(&self) -> f32 {
        self.table.columns.values[self.index]
    }

    pub fn unit(&self) -> &'a str {
        &self.table.columns.units[self.index]
    }

    pub fn id(&self) -> i64 {
        self.table.columns.ids[self.index]
    }

    /// Tag of factor column `factor` for this record (empty when not applicable).
    pub fn factor(&self, factor: usize) -> &'a str {
        self.table
            .columns
            .factors
            .get(factor)
            .map(|column| column[self.index].as_str())
            .unwrap_or("")
    }
}

/// Factor name to column position, resolved once per table snapshot.
#[derive(Debug, Clone, Default)]
pub struct FactorIndex {
    positions: HashMap<String, usize>,
}

impl FactorIndex {
    pub fn new(factor_names: &[String]) -> Self {
        let mut positions = HashMap::new();
        for (i, name) in factor_names.iter().enumerate() {
            // First occurrence wins if the engine ever repeats a name.
            positions.entry(name.clone()).or_insert(i);
        }
        Self { positions }
    }

    /// Position of `factor`, if defined.
    pub fn get(&self, factor: &str) -> Option<usize> {
        self.positions.get(factor).copied()
    }

    /// Position of `factor`, failing if the table lacks it.
    pub fn resolve(&self, factor: &str) -> SceneResult<usize> {
        self.get(factor)
            .ok_or_else(|| SceneError::MissingFactor(factor.to_string()))
    }
}

/// Summary of the values of one statistic across objects.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValueSummary {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub median: f32,
    pub count: usize,
}

impl ValueSummary {
    /// Summarize a slice of values, ignoring NaN and infinities.
    pub fn from_samples(samples: &[f32]) -> Self {
        let mut sorted: Vec<f32> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = sorted.len();
        let sum: f32 = sorted.iter().sum();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean: sum / n as f32,
            median,
            count: n,
        }
    }
}
