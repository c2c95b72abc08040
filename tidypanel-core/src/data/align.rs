//! Wide-form pivot: one row per date, one column per flow.
//!
//! Outer join over the union of dates; a flow without an observation on a
//! date gets a null cell.

use super::error::PipelineError;
use crate::domain::{FlowId, LongTable, WideRow, WideTable};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// Pivot a long table. A repeated (flow, date) pair means the consolidator's
/// uniqueness guarantee was broken and is reported, never collapsed.
pub fn pivot(long: &LongTable) -> Result<WideTable, PipelineError> {
    let flows: Vec<FlowId> = long
        .rows
        .iter()
        .map(|r| r.flow_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let column: BTreeMap<&FlowId, usize> = flows.iter().enumerate().map(|(i, f)| (f, i)).collect();

    let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    let mut seen: HashSet<(usize, NaiveDate)> = HashSet::with_capacity(long.len());

    for row in &long.rows {
        let col = column[&row.flow_id];
        if !seen.insert((col, row.date)) {
            return Err(PipelineError::InvariantViolation(format!(
                "long table has more than one row for ({}, {}) at pivot time",
                row.flow_id, row.date
            )));
        }
        by_date
            .entry(row.date)
            .or_insert_with(|| vec![None; flows.len()])[col] = row.value;
    }

    let rows: Vec<WideRow> = by_date
        .into_iter()
        .map(|(date, values)| WideRow { date, values })
        .collect();
    debug!(rows = rows.len(), columns = flows.len(), "pivoted wide table");
    Ok(WideTable { flows, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LongRow;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(flow: &str, date: NaiveDate, value: Option<f64>) -> LongRow {
        LongRow {
            flow_id: flow.into(),
            date,
            value,
            time: None,
            unit: None,
            series_name: None,
            metadata: Vec::new(),
        }
    }

    #[test]
    fn pivot_is_an_outer_join() {
        let long = LongTable {
            metadata_columns: Vec::new(),
            rows: vec![
                row("X", ymd(2020, 1, 1), Some(1.0)),
                row("X", ymd(2020, 1, 2), None),
                row("Y", ymd(2020, 1, 1), Some(2.0)),
                row("Y", ymd(2020, 1, 5), Some(5.0)),
            ],
        };
        let wide = pivot(&long).unwrap();

        assert_eq!(wide.flows, vec![FlowId::from("X"), FlowId::from("Y")]);
        assert_eq!(wide.len(), 3);
        assert_eq!(wide.rows[0].values, vec![Some(1.0), Some(2.0)]);
        assert_eq!(wide.rows[1].values, vec![None, None]);
        assert_eq!(wide.rows[2].values, vec![None, Some(5.0)]);
    }

    #[test]
    fn columns_sorted_by_flow_name() {
        let long = LongTable {
            metadata_columns: Vec::new(),
            rows: vec![row("b", ymd(2020, 1, 1), Some(1.0)), row("A", ymd(2020, 1, 1), Some(2.0))],
        };
        let wide = pivot(&long).unwrap();
        assert_eq!(wide.flows, vec![FlowId::from("A"), FlowId::from("b")]);
        assert_eq!(wide.value(ymd(2020, 1, 1), "b"), Some(1.0));
    }

    #[test]
    fn residual_duplicate_is_an_invariant_violation() {
        let long = LongTable {
            metadata_columns: Vec::new(),
            rows: vec![row("A", ymd(2020, 1, 1), Some(1.0)), row("A", ymd(2020, 1, 1), Some(1.0))],
        };
        assert!(matches!(
            pivot(&long),
            Err(PipelineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn empty_long_table_pivots_to_empty_wide() {
        let wide = pivot(&LongTable::default()).unwrap();
        assert!(wide.is_empty());
        assert!(wide.flows.is_empty());
    }
}
