//! Run-level diagnostics: what was skipped, excluded or nulled, per flow.

use super::ids::FlowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row accounting for one coerced fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDiagnostics {
    /// Rows dropped because the date cell did not parse.
    pub excluded_rows: usize,
    /// Non-empty value cells that did not parse and became null.
    pub null_values: usize,
    /// Rows dropped by the date window.
    pub out_of_window: usize,
}

impl FragmentDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.excluded_rows == 0 && self.null_values == 0
    }
}

/// A flow left out of an `ALL` run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFlow {
    pub flow_id: FlowId,
    pub reason: String,
}

/// Everything a caller needs to report after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Flows the selection resolved to, not counting those skipped before
    /// reading.
    pub resolved_flows: usize,
    pub skipped: Vec<SkippedFlow>,
    pub fragments: BTreeMap<FlowId, FragmentDiagnostics>,
    /// Rows overwritten under the keep-last duplicate policy.
    pub replaced_duplicates: usize,
}

impl RunDiagnostics {
    pub fn record_skip(&mut self, skipped: SkippedFlow) {
        self.skipped.push(skipped);
        self.skipped.sort_by(|a, b| a.flow_id.cmp(&b.flow_id));
    }

    /// Fragments sharing a flow id accumulate into one entry.
    pub fn record_fragment(&mut self, flow_id: &FlowId, diag: FragmentDiagnostics) {
        let entry = self.fragments.entry(flow_id.clone()).or_default();
        entry.excluded_rows += diag.excluded_rows;
        entry.null_values += diag.null_values;
        entry.out_of_window += diag.out_of_window;
    }

    pub fn excluded_rows(&self) -> usize {
        self.fragments.values().map(|d| d.excluded_rows).sum()
    }

    pub fn null_values(&self) -> usize {
        self.fragments.values().map(|d| d.null_values).sum()
    }

    pub fn out_of_window(&self) -> usize {
        self.fragments.values().map(|d| d.out_of_window).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
            && self.replaced_duplicates == 0
            && self.fragments.values().all(FragmentDiagnostics::is_clean)
    }

    /// Human-readable summary lines, one per finding.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for skip in &self.skipped {
            lines.push(format!("skipped flow {}: {}", skip.flow_id, skip.reason));
        }
        for (flow_id, diag) in &self.fragments {
            if diag.excluded_rows > 0 {
                lines.push(format!(
                    "{flow_id}: {} row(s) excluded (unparseable date)",
                    diag.excluded_rows
                ));
            }
            if diag.null_values > 0 {
                lines.push(format!(
                    "{flow_id}: {} value(s) set to null (unparseable number)",
                    diag.null_values
                ));
            }
            if diag.out_of_window > 0 {
                lines.push(format!(
                    "{flow_id}: {} row(s) outside the date window",
                    diag.out_of_window
                ));
            }
        }
        if self.replaced_duplicates > 0 {
            lines.push(format!(
                "{} duplicate (flow, date) row(s) replaced by a later row",
                self.replaced_duplicates
            ));
        }
        lines
    }
}
