//! Column name normalization onto the canonical schema.

use crate::domain::FlowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aliases every source gets, keyed by snake_case name.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("obs_value", "value"),
    ("valor", "value"),
    ("time_period", "time"),
    ("period", "time"),
    ("periodo", "time"),
    ("fecha", "date"),
    ("unit_measure", "unit"),
    ("unidad", "unit"),
    ("series", "series_name"),
];

/// `SeriesName` → `series_name`, `Unit Mult` → `unit_mult`, `OBS_VALUE` → `obs_value`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if c.is_uppercase()
                && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit())
            {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
        prev = Some(c);
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// User-supplied renames: a global table plus per-flow overrides.
///
/// Keys match either the header as written or its snake_case form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameTable {
    pub global: BTreeMap<String, String>,
    pub flows: BTreeMap<String, BTreeMap<String, String>>,
}

impl RenameTable {
    pub fn with_global(mut self, from: &str, to: &str) -> Self {
        self.global.insert(from.to_string(), to.to_string());
        self
    }

    pub fn with_flow(mut self, flow_id: &str, from: &str, to: &str) -> Self {
        self.flows
            .entry(flow_id.to_string())
            .or_default()
            .insert(from.to_string(), to.to_string());
        self
    }

    /// Canonical name for `header` in `flow_id`: per-flow table, global
    /// table, built-in aliases, else the snake_case form.
    pub fn canonical_name(&self, flow_id: &FlowId, header: &str) -> String {
        let header = header.trim();
        let snake = snake_case(header);
        let per_flow = self.flows.get(flow_id.as_str());

        for key in [header, snake.as_str()] {
            if let Some(name) = per_flow.and_then(|t| t.get(key)) {
                return name.clone();
            }
            if let Some(name) = self.global.get(key) {
                return name.clone();
            }
        }
        BUILTIN_ALIASES
            .iter()
            .find(|(from, _)| *from == snake)
            .map(|(_, to)| (*to).to_string())
            .unwrap_or(snake)
    }

    /// Canonical names for a whole header row. A name already taken by an
    /// earlier column gets a `_2`, `_3`, ... suffix.
    pub fn canonical_headers(&self, flow_id: &FlowId, headers: &[String]) -> Vec<String> {
        let mut taken: Vec<String> = Vec::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            let mut name = self.canonical_name(flow_id, header);
            if name.is_empty() {
                name = format!("column_{}", i + 1);
            }
            if taken.contains(&name) {
                let base = name.clone();
                let mut n = 2;
                while taken.contains(&name) {
                    name = format!("{base}_{n}");
                    n += 1;
                }
            }
            taken.push(name);
        }
        taken
    }
}
