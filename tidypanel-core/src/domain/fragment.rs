//! Raw fragments: the untyped content of one flow's CSV file.

use super::ids::FlowId;
use std::path::PathBuf;

/// One CSV record. `cells` is aligned with [`RawFragment::headers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line in the source file (the header is line 1).
    pub line: u64,
    pub cells: Vec<String>,
}

/// Raw tabular content of a single flow, every cell still text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFragment {
    pub flow_id: FlowId,
    pub source: Option<PathBuf>,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawFragment {
    pub fn new(flow_id: impl Into<FlowId>, headers: Vec<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            source: None,
            headers,
            rows: Vec::new(),
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Build a fragment from in-memory records, for collaborators that hand
    /// tables over directly instead of through the data directory.
    pub fn from_records(flow_id: impl Into<FlowId>, headers: &[&str], rows: &[&[&str]]) -> Self {
        let mut fragment = Self::new(
            flow_id,
            headers.iter().map(|h| (*h).to_string()).collect(),
        );
        for row in rows {
            fragment.push_row(row.iter().map(|c| (*c).to_string()).collect());
        }
        fragment
    }

    /// Append a record. Short records are padded with empty cells and long
    /// ones truncated so every row matches the header width.
    pub fn push_row(&mut self, cells: Vec<String>) {
        let line = self.rows.last().map_or(2, |r| r.line + 1);
        self.push_row_at(line, cells);
    }

    /// Append a record read from `line` of the source file.
    pub fn push_row_at(&mut self, line: u64, mut cells: Vec<String>) {
        cells.resize(self.headers.len(), String::new());
        self.rows.push(RawRow { line, cells });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_row_pads_to_header_width() {
        let mut fragment = RawFragment::new("X", vec!["date".into(), "value".into()]);
        fragment.push_row(vec!["2020-01-01".into()]);
        fragment.push_row(vec!["2020-01-02".into(), "1".into(), "extra".into()]);

        assert_eq!(fragment.rows[0].cells, vec!["2020-01-01", ""]);
        assert_eq!(fragment.rows[1].cells, vec!["2020-01-02", "1"]);
        assert_eq!(fragment.rows[1].line, 3);
    }
}
