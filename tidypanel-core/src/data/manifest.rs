//! `manifest.json` sidecar describing a written catalog.

use super::error::PipelineError;
use crate::domain::{FlowId, LongTable, WideTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Per-flow row counts and date coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    pub flow_id: FlowId,
    pub rows: usize,
    pub null_values: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Catalog description. Holds no wall-clock time, so identical runs produce
/// identical manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogManifest {
    pub flows: Vec<FlowSummary>,
    pub long_rows: usize,
    pub wide_rows: usize,
    pub metadata_columns: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// BLAKE3 of the long table contents.
    pub data_hash: String,
    pub files: Vec<String>,
}

impl CatalogManifest {
    pub fn build(long: &LongTable, wide: &WideTable, files: Vec<String>) -> Self {
        let mut by_flow: BTreeMap<&FlowId, FlowSummary> = BTreeMap::new();
        for row in &long.rows {
            let summary = by_flow.entry(&row.flow_id).or_insert_with(|| FlowSummary {
                flow_id: row.flow_id.clone(),
                rows: 0,
                null_values: 0,
                start_date: row.date,
                end_date: row.date,
            });
            summary.rows += 1;
            if row.value.is_none() {
                summary.null_values += 1;
            }
            summary.start_date = summary.start_date.min(row.date);
            summary.end_date = summary.end_date.max(row.date);
        }

        let range = long.date_range();
        Self {
            flows: by_flow.into_values().collect(),
            long_rows: long.len(),
            wide_rows: wide.len(),
            metadata_columns: long.metadata_columns.clone(),
            start_date: range.map(|(start, _)| start),
            end_date: range.map(|(_, end)| end),
            data_hash: content_hash(long),
            files,
        }
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| PipelineError::Manifest(format!("parse {}: {e}", path.display())))
    }
}

fn hash_opt_str(hasher: &mut blake3::Hasher, cell: Option<&str>) {
    match cell {
        Some(s) => {
            hasher.update(&[1]);
            hasher.update(s.as_bytes());
            hasher.update(&[0]);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

/// Content hash of a long table: column names, then every row in table order.
pub fn content_hash(long: &LongTable) -> String {
    let mut hasher = blake3::Hasher::new();
    for name in &long.metadata_columns {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.update(&[0xff]);

    for row in &long.rows {
        hasher.update(row.flow_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&row.date.format("%Y-%m-%d").to_string().into_bytes());
        match row.value {
            Some(v) => {
                hasher.update(&[1]);
                hasher.update(&v.to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hash_opt_str(&mut hasher, row.time.as_deref());
        hash_opt_str(&mut hasher, row.unit.as_deref());
        hash_opt_str(&mut hasher, row.series_name.as_deref());
        for cell in &row.metadata {
            hash_opt_str(&mut hasher, cell.as_deref());
        }
    }

    hasher.finalize().to_hex().to_string()
}
