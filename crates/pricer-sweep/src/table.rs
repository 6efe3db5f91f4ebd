//! The accumulated result table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::extract::MetricRecord;
use crate::types::{ConfigurationPoint, Quadrant, ThreadingMode, VariantId};

/// One row: a configuration point with the metrics measured for it.
///
/// Field order is the persisted column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub variant: VariantId,
    pub instruction_count: Option<u64>,
    pub avg_time_per_op_ms: Option<f64>,
    pub ops_per_second: Option<f64>,
    pub dividends: u32,
    pub smoothing: bool,
    pub acceleration: bool,
    pub threading: ThreadingMode,
    /// Quadrant label of the batch this row was swept in.
    pub sweep_tag: String,
}

impl ResultRow {
    pub fn new(point: &ConfigurationPoint, metrics: MetricRecord) -> Self {
        Self {
            variant: point.variant.clone(),
            instruction_count: metrics.instruction_count,
            avg_time_per_op_ms: metrics.avg_time_per_op_ms,
            ops_per_second: metrics.ops_per_second,
            dividends: point.dividends,
            smoothing: point.smoothing,
            acceleration: point.acceleration,
            threading: point.threading,
            sweep_tag: point.quadrant().label().to_string(),
        }
    }

    pub fn point(&self) -> ConfigurationPoint {
        ConfigurationPoint {
            variant: self.variant.clone(),
            dividends: self.dividends,
            smoothing: self.smoothing,
            acceleration: self.acceleration,
            threading: self.threading,
        }
    }

    pub fn metrics(&self) -> MetricRecord {
        MetricRecord {
            instruction_count: self.instruction_count,
            avg_time_per_op_ms: self.avg_time_per_op_ms,
            ops_per_second: self.ops_per_second,
        }
    }

    pub fn quadrant(&self) -> Quadrant {
        Quadrant::from_flags(self.smoothing, self.acceleration)
    }
}

/// Axis constraints for [`ResultTable::filter_axes`]. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisFilter {
    pub variant: Option<VariantId>,
    pub dividends: Option<u32>,
    pub smoothing: Option<bool>,
    pub acceleration: Option<bool>,
    pub threading: Option<ThreadingMode>,
}

impl AxisFilter {
    pub fn matches(&self, row: &ResultRow) -> bool {
        self.variant.as_ref().map_or(true, |v| *v == row.variant)
            && self.dividends.map_or(true, |d| d == row.dividends)
            && self.smoothing.map_or(true, |s| s == row.smoothing)
            && self.acceleration.map_or(true, |a| a == row.acceleration)
            && self.threading.map_or(true, |t| t == row.threading)
    }

    pub fn quadrant(quadrant: Quadrant) -> Self {
        Self {
            smoothing: Some(quadrant.smoothing()),
            acceleration: Some(quadrant.acceleration()),
            ..Self::default()
        }
    }
}

/// Rows in append order. Does not enforce uniqueness.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    /// Append every row of `other` after the rows of `self`.
    pub fn append(&mut self, other: ResultTable) {
        self.rows.extend(other.rows);
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Variants in first-appearance order.
    pub fn variants(&self) -> Vec<VariantId> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.variant) {
                seen.push(row.variant.clone());
            }
        }
        seen
    }

    pub fn group_by_variant(&self) -> BTreeMap<VariantId, ResultTable> {
        let mut groups: BTreeMap<VariantId, ResultTable> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.variant.clone()).or_default().push(row.clone());
        }
        groups
    }

    pub fn filter<P>(&self, predicate: P) -> ResultTable
    where
        P: Fn(&ResultRow) -> bool,
    {
        ResultTable {
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    pub fn filter_axes(&self, filter: &AxisFilter) -> ResultTable {
        self.filter(|r| filter.matches(r))
    }
}

impl FromIterator<ResultRow> for ResultTable {
    fn from_iter<I: IntoIterator<Item = ResultRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ResultTable {
    type Item = &'a ResultRow;
    type IntoIter = std::slice::Iter<'a, ResultRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
