//! Long (tidy) and wide tables.

use super::ids::FlowId;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// One row of the long table, unique on (`flow_id`, `date`).
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub flow_id: FlowId,
    pub date: NaiveDate,
    pub value: Option<f64>,
    pub time: Option<String>,
    pub unit: Option<String>,
    pub series_name: Option<String>,
    /// Aligned with [`LongTable::metadata_columns`].
    pub metadata: Vec<Option<String>>,
}

/// Tidy table, sorted by (`flow_id`, `date`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LongTable {
    pub metadata_columns: Vec<String>,
    pub rows: Vec<LongRow>,
}

impl LongTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct flow ids, sorted.
    pub fn flows(&self) -> Vec<FlowId> {
        self.rows
            .iter()
            .map(|r| r.flow_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn distinct_dates(&self) -> BTreeSet<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// `None` if there is no row; `Some(None)` for a row with a null value.
    pub fn value_at(&self, flow_id: &str, date: NaiveDate) -> Option<Option<f64>> {
        self.rows
            .iter()
            .find(|r| r.flow_id.as_str() == flow_id && r.date == date)
            .map(|r| r.value)
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let dates = self.distinct_dates();
        Some((*dates.first()?, *dates.last()?))
    }
}

/// One wide row: a date and one cell per flow.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub date: NaiveDate,
    /// Aligned with [`WideTable::flows`].
    pub values: Vec<Option<f64>>,
}

/// One row per date (ascending), one column per flow (sorted by name).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    pub flows: Vec<FlowId>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, flow_id: &str) -> Option<usize> {
        self.flows.iter().position(|f| f.as_str() == flow_id)
    }

    /// Cell at (`date`, `flow_id`); `None` when absent or null.
    pub fn value(&self, date: NaiveDate, flow_id: &str) -> Option<f64> {
        let col = self.column_index(flow_id)?;
        let row = self.rows.iter().find(|r| r.date == date)?;
        row.values[col]
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }
}
