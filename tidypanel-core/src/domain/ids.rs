use super::observation::columns;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Flow identifier: the stem of the flow's CSV file (e.g. `DF_TRM_DAILY_HIST`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    /// Surrounding whitespace is dropped; flow lists are often hand-edited.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A flow named `date` would collide with the wide table's date column.
    pub fn is_reserved(&self) -> bool {
        self.0 == columns::DATE
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FlowId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl Borrow<str> for FlowId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FlowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
