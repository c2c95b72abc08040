//! Flows and flow selection.

use super::ids::FlowId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::path::PathBuf;

/// A flow discovered for this run: its id and the CSV file backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub id: FlowId,
    pub path: PathBuf,
}

/// Which flows a run consolidates.
///
/// `All` scans the data directory and tolerates per-flow failures;
/// `Explicit` treats every named flow as required.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowSelection {
    #[default]
    All,
    Explicit(Vec<FlowId>),
}

impl FlowSelection {
    /// Parse `"ALL"` (any case) or a comma-separated list of flow ids.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Self::All;
        }
        Self::from_ids(trimmed.split(','))
    }

    /// Build an explicit selection, dropping blanks and repeated ids.
    /// An empty list means `All`.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FlowId>,
    {
        let mut seen = HashSet::new();
        let flows: Vec<FlowId> = ids
            .into_iter()
            .map(Into::<FlowId>::into)
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if flows.is_empty() {
            Self::All
        } else {
            Self::Explicit(flows)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Text(String),
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for FlowSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SelectionRepr::deserialize(deserializer)? {
            SelectionRepr::Text(text) => Self::parse(&text),
            SelectionRepr::List(ids) => Self::from_ids(ids),
        })
    }
}

impl Serialize for FlowSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("ALL"),
            Self::Explicit(ids) => ids.serialize(serializer),
        }
    }
}
