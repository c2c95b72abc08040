//! Flow lists read from a file (`--flows-from-file`).
//!
//! Formats, by extension:
//! - `.txt`: one flow id per line, `#` starts a comment
//! - `.json`: an array of strings, or of objects with a `flow_id` field
//! - anything else: CSV; the `flow_id`/`Flow`/`FLOW_ID`/`id`/`Id` column
//!   if present, else the first column

use crate::config::ConfigError;
use serde_json::Value;
use std::path::Path;
use tidypanel_core::domain::{FlowId, FlowSelection};

const ID_COLUMNS: &[&str] = &["flow_id", "Flow", "FLOW_ID", "id", "Id"];

/// Read an explicit flow selection from `path`. An empty list is an error,
/// never an implicit `ALL`.
pub fn read_flows_from_file(path: &Path) -> Result<FlowSelection, ConfigError> {
    let fail = |reason: String| ConfigError::FlowList {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| fail(format!("read: {e}")))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let ids = match ext.as_deref() {
        Some("txt") => parse_txt(&content),
        Some("json") => parse_json(&content).map_err(fail)?,
        _ => parse_csv(&content).map_err(fail)?,
    };

    match FlowSelection::from_ids(ids) {
        FlowSelection::All => Err(fail("no flows listed".into())),
        explicit => Ok(explicit),
    }
}

fn parse_txt(content: &str) -> Vec<FlowId> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(FlowId::new)
        .collect()
}

fn parse_json(content: &str) -> Result<Vec<FlowId>, String> {
    let value: Value = serde_json::from_str(content).map_err(|e| format!("parse JSON: {e}"))?;
    let Value::Array(items) = value else {
        return Err("expected a JSON array".into());
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(id) => Ok(FlowId::new(id)),
            Value::Object(map) => match map.get("flow_id") {
                Some(Value::String(id)) => Ok(FlowId::new(id)),
                _ => Err(format!("item {i}: object without a string 'flow_id'")),
            },
            _ => Err(format!("item {i}: expected a string or an object")),
        })
        .collect()
}

fn parse_csv(content: &str) -> Result<Vec<FlowId>, String> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| format!("parse CSV header: {e}"))?
        .clone();
    let column = ID_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        .unwrap_or(0);

    let mut ids = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| format!("parse CSV: {e}"))?;
        if let Some(cell) = record.get(column) {
            ids.push(FlowId::new(cell));
        }
    }
    Ok(ids)
}
