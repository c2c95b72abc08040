//! Long-form consolidation: concatenate typed fragments, resolve duplicate
//! (flow, date) keys, sort by (flow, date).

use super::error::PipelineError;
use crate::domain::{FlowId, LongRow, LongTable, TypedFragment};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// What to do with a second row for the same (flow, date).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with [`PipelineError::DuplicateKey`].
    #[default]
    Reject,
    /// The row read later wins.
    KeepLast,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "keep-last" | "keep_last" | "last" => Ok(Self::KeepLast),
            other => Err(format!(
                "unknown duplicate policy '{other}'. Valid: reject, keep-last"
            )),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reject => "reject",
            Self::KeepLast => "keep-last",
        })
    }
}

/// Consolidated long table plus how many rows keep-last replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Consolidated {
    pub table: LongTable,
    pub replaced: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Consolidator {
    policy: DuplicatePolicy,
}

impl Consolidator {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Merge fragments in read order. Schemas may differ: the metadata
    /// columns are the sorted union, absent cells are null.
    pub fn consolidate<I>(&self, fragments: I) -> Result<Consolidated, PipelineError>
    where
        I: IntoIterator<Item = TypedFragment>,
    {
        let fragments: Vec<TypedFragment> = fragments.into_iter().collect();
        let metadata_columns: Vec<String> = fragments
            .iter()
            .flat_map(|f| f.metadata_columns.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Keyed on (flow, date), so iteration order is the output order.
        let mut rows: BTreeMap<(FlowId, NaiveDate), LongRow> = BTreeMap::new();
        let mut replaced = 0;

        for fragment in fragments {
            let flow_id = fragment.flow_id;
            for obs in fragment.observations {
                let metadata = metadata_columns
                    .iter()
                    .map(|name| obs.metadata.get(name).cloned().flatten())
                    .collect();
                let row = LongRow {
                    flow_id: flow_id.clone(),
                    date: obs.date,
                    value: obs.value,
                    time: obs.time,
                    unit: obs.unit,
                    series_name: obs.series_name,
                    metadata,
                };
                let key = (flow_id.clone(), obs.date);
                if rows.contains_key(&key) {
                    match self.policy {
                        DuplicatePolicy::Reject => {
                            return Err(PipelineError::DuplicateKey {
                                flow_id: key.0,
                                date: key.1,
                            });
                        }
                        DuplicatePolicy::KeepLast => replaced += 1,
                    }
                }
                rows.insert(key, row);
            }
        }

        if replaced > 0 {
            warn!(replaced, "duplicate (flow, date) rows replaced by later rows");
        }
        let table = LongTable {
            metadata_columns,
            rows: rows.into_values().collect(),
        };
        debug!(rows = table.len(), "consolidated long table");
        Ok(Consolidated { table, replaced })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observation;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fragment(flow: &str, points: &[(NaiveDate, Option<f64>)]) -> TypedFragment {
        TypedFragment::new(
            flow,
            points
                .iter()
                .map(|(d, v)| Observation::new(*d, *v))
                .collect(),
        )
    }

    #[test]
    fn output_is_sorted_by_flow_then_date() {
        let consolidated = Consolidator::default()
            .consolidate(vec![
                fragment("B", &[(ymd(2020, 1, 2), Some(2.0)), (ymd(2020, 1, 1), Some(1.0))]),
                fragment("A", &[(ymd(2020, 1, 3), Some(3.0))]),
            ])
            .unwrap();
        let keys: Vec<(&str, NaiveDate)> = consolidated
            .table
            .rows
            .iter()
            .map(|r| (r.flow_id.as_str(), r.date))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("A", ymd(2020, 1, 3)),
                ("B", ymd(2020, 1, 1)),
                ("B", ymd(2020, 1, 2)),
            ]
        );
    }

    #[test]
    fn default_policy_rejects_duplicates() {
        let err = Consolidator::default()
            .consolidate(vec![
                fragment("A", &[(ymd(2020, 1, 1), Some(1.0))]),
                fragment("A", &[(ymd(2020, 1, 1), Some(9.0))]),
            ])
            .unwrap_err();
        match err {
            PipelineError::DuplicateKey { flow_id, date } => {
                assert_eq!(flow_id.as_str(), "A");
                assert_eq!(date, ymd(2020, 1, 1));
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn keep_last_takes_later_fragment() {
        let consolidated = Consolidator::new(DuplicatePolicy::KeepLast)
            .consolidate(vec![
                fragment("A", &[(ymd(2020, 1, 1), Some(1.0))]),
                fragment("A", &[(ymd(2020, 1, 1), Some(9.0))]),
            ])
            .unwrap();
        assert_eq!(consolidated.table.len(), 1);
        assert_eq!(consolidated.table.rows[0].value, Some(9.0));
        assert_eq!(consolidated.replaced, 1);
    }

    #[test]
    fn metadata_columns_are_unioned_and_null_filled() {
        let mut a = fragment("A", &[(ymd(2020, 1, 1), Some(1.0))]);
        a.metadata_columns = vec!["source".into()];
        a.observations[0]
            .metadata
            .insert("source".into(), Some("banrep".into()));
        let mut b = fragment("B", &[(ymd(2020, 1, 1), Some(2.0))]);
        b.metadata_columns = vec!["obs_status".into()];
        b.observations[0]
            .metadata
            .insert("obs_status".into(), Some("A".into()));

        let table = Consolidator::default().consolidate(vec![a, b]).unwrap().table;
        assert_eq!(table.metadata_columns, vec!["obs_status", "source"]);
        assert_eq!(table.rows[0].metadata, vec![None, Some("banrep".to_string())]);
        assert_eq!(table.rows[1].metadata, vec![Some("A".to_string()), None]);
    }

    #[test]
    fn policy_parses_from_str() {
        assert_eq!("keep-last".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::KeepLast);
        assert_eq!("REJECT".parse::<DuplicatePolicy>().unwrap(), DuplicatePolicy::Reject);
        assert!("first".parse::<DuplicatePolicy>().is_err());
    }
}
