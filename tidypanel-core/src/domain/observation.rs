//! Typed fragments produced by the coercion engine.

use super::diagnostics::FragmentDiagnostics;
use super::fragment::RawFragment;
use super::ids::FlowId;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Canonical column names shared by every stage after coercion.
pub mod columns {
    pub const FLOW_ID: &str = "flow_id";
    pub const DATE: &str = "date";
    pub const TIME: &str = "time";
    pub const VALUE: &str = "value";
    pub const UNIT: &str = "unit";
    pub const SERIES_NAME: &str = "series_name";
}

/// One typed row of a flow.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    /// `None` when the source cell was empty or not a number.
    pub value: Option<f64>,
    /// Original period label (e.g. `2020M01`), kept as text.
    pub time: Option<String>,
    pub unit: Option<String>,
    pub series_name: Option<String>,
    /// Pass-through columns keyed by canonical name.
    pub metadata: BTreeMap<String, Option<String>>,
}

impl Observation {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self {
            date,
            value,
            time: None,
            unit: None,
            series_name: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// A coerced fragment: canonical schema, parsed dates, nullable values.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedFragment {
    pub flow_id: FlowId,
    pub observations: Vec<Observation>,
    /// Metadata column names in source order.
    pub metadata_columns: Vec<String>,
    pub diagnostics: FragmentDiagnostics,
}

impl TypedFragment {
    pub fn new(flow_id: impl Into<FlowId>, observations: Vec<Observation>) -> Self {
        Self {
            flow_id: flow_id.into(),
            observations,
            metadata_columns: Vec::new(),
            diagnostics: FragmentDiagnostics::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Render back to text in the canonical schema: ISO dates, `.` decimals,
    /// empty cells for nulls.
    pub fn to_raw(&self) -> RawFragment {
        let mut headers: Vec<String> = [
            columns::DATE,
            columns::TIME,
            columns::VALUE,
            columns::UNIT,
            columns::SERIES_NAME,
        ]
        .iter()
        .map(|c| (*c).to_string())
        .collect();
        headers.extend(self.metadata_columns.iter().cloned());

        let mut raw = RawFragment::new(self.flow_id.clone(), headers);
        for obs in &self.observations {
            let mut cells = vec![
                obs.date.format("%Y-%m-%d").to_string(),
                obs.time.clone().unwrap_or_default(),
                obs.value.map(|v| v.to_string()).unwrap_or_default(),
                obs.unit.clone().unwrap_or_default(),
                obs.series_name.clone().unwrap_or_default(),
            ];
            for name in &self.metadata_columns {
                cells.push(
                    obs.metadata
                        .get(name)
                        .cloned()
                        .flatten()
                        .unwrap_or_default(),
                );
            }
            raw.push_row(cells);
        }
        raw
    }
}
