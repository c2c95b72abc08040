//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Outer join: wide row count equals the distinct date count
//! 2. Idempotence: coercing a typed fragment changes nothing
//! 3. Canonical rendering: re-coercing the text form gives the same rows
//! 4. Long key uniqueness and ordering

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tidypanel_core::data::{pivot, Coerce, CoercionEngine, Consolidator, DuplicatePolicy};
use tidypanel_core::domain::{RawFragment, TypedFragment};

// ── Strategies (proptest) ────────────────────────────────────────────

/// Day offset → value; `None` renders as an empty or `NA` cell.
fn arb_series() -> impl Strategy<Value = BTreeMap<u32, Option<i32>>> {
    prop::collection::btree_map(0u32..90, prop::option::of(-4000i32..4000), 1..25)
}

fn arb_flows() -> impl Strategy<Value = Vec<BTreeMap<u32, Option<i32>>>> {
    prop::collection::vec(arb_series(), 1..5)
}

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn raw_fragment(idx: usize, series: &BTreeMap<u32, Option<i32>>) -> RawFragment {
    let mut raw = RawFragment::new(
        format!("F{idx}"),
        vec!["TIME_PERIOD".into(), "OBS_VALUE".into(), "OBS_STATUS".into()],
    );
    for (offset, value) in series {
        let date = base() + Duration::days(i64::from(*offset));
        let cell = match value {
            Some(v) => (f64::from(*v) / 4.0).to_string(),
            None if offset % 2 == 0 => String::new(),
            None => "NA".to_string(),
        };
        raw.push_row(vec![date.format("%Y%m%d").to_string(), cell, "A".into()]);
    }
    raw
}

fn coerce_all(engine: &CoercionEngine, flows: &[BTreeMap<u32, Option<i32>>]) -> Vec<TypedFragment> {
    flows
        .iter()
        .enumerate()
        .map(|(i, s)| raw_fragment(i, s).coerce(engine).unwrap())
        .collect()
}

// ── 1. Outer join row count ──────────────────────────────────────────

proptest! {
    #[test]
    fn wide_rows_equal_distinct_dates(flows in arb_flows()) {
        let engine = CoercionEngine::default();
        let typed = coerce_all(&engine, &flows);

        let distinct: BTreeSet<u32> = flows.iter().flat_map(|s| s.keys().copied()).collect();
        let long = Consolidator::new(DuplicatePolicy::Reject).consolidate(typed).unwrap().table;
        let wide = pivot(&long).unwrap();

        prop_assert_eq!(wide.len(), distinct.len());
        prop_assert_eq!(wide.flows.len(), flows.len());
        prop_assert_eq!(long.len(), flows.iter().map(|s| s.len()).sum::<usize>());
    }

    /// Every long value shows up in its wide cell.
    #[test]
    fn wide_cells_match_long_values(flows in arb_flows()) {
        let engine = CoercionEngine::default();
        let long = Consolidator::default()
            .consolidate(coerce_all(&engine, &flows))
            .unwrap()
            .table;
        let wide = pivot(&long).unwrap();

        for row in &long.rows {
            prop_assert_eq!(wide.value(row.date, row.flow_id.as_str()), row.value);
        }
    }
}

// ── 2/3. Idempotence ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn coerce_is_idempotent(series in arb_series()) {
        let engine = CoercionEngine::default();
        let once = raw_fragment(0, &series).coerce(&engine).unwrap();
        let twice = once.coerce(&engine).unwrap();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn canonical_text_recoerces_to_same_observations(series in arb_series()) {
        let engine = CoercionEngine::default();
        let once = raw_fragment(0, &series).coerce(&engine).unwrap();
        let again = once.to_raw().coerce(&engine).unwrap();
        prop_assert_eq!(again.observations, once.observations);
        prop_assert_eq!(again.metadata_columns, once.metadata_columns);
    }
}

// ── 4. Long key ordering ─────────────────────────────────────────────

proptest! {
    #[test]
    fn long_keys_are_unique_and_sorted(flows in arb_flows()) {
        let engine = CoercionEngine::default();
        let long = Consolidator::default()
            .consolidate(coerce_all(&engine, &flows))
            .unwrap()
            .table;
        for pair in long.rows.windows(2) {
            let a = (&pair[0].flow_id, pair[0].date);
            let b = (&pair[1].flow_id, pair[1].date);
            prop_assert!(a < b, "{:?} !< {:?}", a, b);
        }
    }
}
