//! Type coercion engine: raw fragment → typed fragment.
//!
//! Policy:
//! - column names are mapped onto the canonical schema (`date`, `time`,
//!   `value`, `unit`, `series_name`); other columns pass through as text
//!   metadata
//! - a row whose date does not parse is excluded and counted
//! - a value that does not parse becomes null and is counted; the row stays
//! - locale and renames come from [`CoercionOptions`], never the environment
//!
//! Coercing an already-typed fragment is a no-op.

use super::error::PipelineError;
use super::locale::{Locale, NumberCell};
use super::period::parse_date;
use super::rename::RenameTable;
use crate::domain::{
    columns, FlowId, FragmentDiagnostics, Observation, RawFragment, TypedFragment,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Inclusive date window. Open on either side when unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoercionOptions {
    pub locale: Locale,
    pub renames: RenameTable,
    pub window: DateWindow,
}

/// Where each canonical column sits in a raw fragment's header.
struct ColumnLayout {
    date: Option<usize>,
    time: Option<usize>,
    value: usize,
    unit: Option<usize>,
    series_name: Option<usize>,
    metadata: Vec<(usize, String)>,
}

impl ColumnLayout {
    fn detect(fragment: &RawFragment, renames: &RenameTable) -> Result<Self, PipelineError> {
        let names = renames.canonical_headers(&fragment.flow_id, &fragment.headers);
        let find = |target: &str| names.iter().position(|n| n == target);

        let date = find(columns::DATE);
        let time = find(columns::TIME);
        if date.is_none() && time.is_none() {
            return Err(PipelineError::unreadable(
                &fragment.flow_id,
                format!("no date or time column (columns: {})", names.join(", ")),
            ));
        }
        let value = find(columns::VALUE).ok_or_else(|| {
            PipelineError::unreadable(
                &fragment.flow_id,
                format!("no value column (columns: {})", names.join(", ")),
            )
        })?;
        let unit = find(columns::UNIT);
        let series_name = find(columns::SERIES_NAME);

        let claimed = [date, time, Some(value), unit, series_name];
        let metadata = names
            .iter()
            .enumerate()
            .filter(|(i, name)| !claimed.contains(&Some(*i)) && name.as_str() != columns::FLOW_ID)
            .map(|(i, name)| (i, name.clone()))
            .collect();

        Ok(Self {
            date,
            time,
            value,
            unit,
            series_name,
            metadata,
        })
    }
}

/// Coerces fragments with a fixed locale, rename table and date window.
#[derive(Debug, Clone, Default)]
pub struct CoercionEngine {
    options: CoercionOptions,
}

impl CoercionEngine {
    pub fn new(options: CoercionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CoercionOptions {
        &self.options
    }

    /// Parse a raw fragment into the canonical typed schema.
    ///
    /// Fails with [`PipelineError::UnreadableFragment`] when the fragment
    /// has no date/time column or no value column.
    pub fn coerce_raw(&self, raw: &RawFragment) -> Result<TypedFragment, PipelineError> {
        let layout = ColumnLayout::detect(raw, &self.options.renames)?;
        let locale = &self.options.locale;
        let mut diagnostics = FragmentDiagnostics::default();
        let mut observations = Vec::with_capacity(raw.len());

        for row in &raw.rows {
            let cell = |idx: Option<usize>| idx.map(|i| row.cells[i].as_str());

            let date = cell(layout.date)
                .and_then(|c| parse_date(c, &locale.date_formats))
                .or_else(|| cell(layout.time).and_then(|c| parse_date(c, &locale.date_formats)));
            let Some(date) = date else {
                diagnostics.excluded_rows += 1;
                continue;
            };
            if !self.options.window.contains(date) {
                diagnostics.out_of_window += 1;
                continue;
            }

            let value = match locale.parse_number(&row.cells[layout.value]) {
                NumberCell::Value(v) => Some(v),
                NumberCell::Empty => None,
                NumberCell::Invalid => {
                    diagnostics.null_values += 1;
                    None
                }
            };

            let metadata: BTreeMap<String, Option<String>> = layout
                .metadata
                .iter()
                .map(|(i, name)| (name.clone(), text_cell(&row.cells[*i])))
                .collect();

            observations.push(Observation {
                date,
                value,
                time: cell(layout.time).and_then(text_cell),
                unit: cell(layout.unit).and_then(text_cell),
                series_name: cell(layout.series_name).and_then(text_cell),
                metadata,
            });
        }

        if diagnostics.excluded_rows > 0 {
            warn!(
                flow = %raw.flow_id,
                excluded = diagnostics.excluded_rows,
                "rows excluded: unparseable date"
            );
        }
        if diagnostics.null_values > 0 {
            warn!(
                flow = %raw.flow_id,
                nulls = diagnostics.null_values,
                "values set to null: unparseable number"
            );
        }
        debug!(
            flow = %raw.flow_id,
            rows = observations.len(),
            out_of_window = diagnostics.out_of_window,
            "coerced fragment"
        );

        Ok(TypedFragment {
            flow_id: raw.flow_id.clone(),
            observations,
            metadata_columns: layout.metadata.into_iter().map(|(_, name)| name).collect(),
            diagnostics,
        })
    }

    /// A typed fragment is already in the canonical schema; only the date
    /// window applies, and rows it drops are counted.
    pub fn coerce_typed(&self, typed: &TypedFragment) -> TypedFragment {
        let mut out = typed.clone();
        if self.options.window.is_unbounded() {
            return out;
        }
        let before = out.observations.len();
        out.observations
            .retain(|obs| self.options.window.contains(obs.date));
        out.diagnostics.out_of_window += before - out.observations.len();
        out
    }
}

/// Anything the coercion engine accepts.
pub trait Coerce {
    fn coerce(&self, engine: &CoercionEngine) -> Result<TypedFragment, PipelineError>;
}

impl Coerce for RawFragment {
    fn coerce(&self, engine: &CoercionEngine) -> Result<TypedFragment, PipelineError> {
        engine.coerce_raw(self)
    }
}

impl Coerce for TypedFragment {
    fn coerce(&self, engine: &CoercionEngine) -> Result<TypedFragment, PipelineError> {
        Ok(engine.coerce_typed(self))
    }
}

/// Convenience for callers holding a flow id and rows in memory.
pub fn coerce_records(
    engine: &CoercionEngine,
    flow_id: impl Into<FlowId>,
    headers: &[&str],
    rows: &[&[&str]],
) -> Result<TypedFragment, PipelineError> {
    RawFragment::from_records(flow_id, headers, rows).coerce(engine)
}

fn text_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
