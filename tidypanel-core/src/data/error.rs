//! Structured error types for the consolidation pipeline.

use super::schema::SchemaError;
use crate::domain::{FlowId, FlowSelection, SkippedFlow};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the reader, coercion engine, consolidator, pivoter and
/// writer. Displayable in CLI and log contexts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no CSV file for flow '{flow_id}' (expected {})", path.display())]
    MissingFlow { flow_id: FlowId, path: PathBuf },

    #[error("unreadable fragment for flow '{flow_id}': {reason}")]
    UnreadableFragment { flow_id: FlowId, reason: String },

    #[error("duplicate key: flow '{flow_id}' has more than one row for {date}")]
    DuplicateKey { flow_id: FlowId, date: NaiveDate },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("no flows to consolidate in {} (check the data directory or the flow list)", dir.display())]
    NoFlows { dir: PathBuf },

    #[error("run cancelled after {completed} of {total} flow(s)")]
    Cancelled { completed: usize, total: usize },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("CSV output error: {0}")]
    Csv(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("schema mismatch: {0}")]
    Schema(#[from] SchemaError),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unreadable(flow_id: &FlowId, reason: impl Into<String>) -> Self {
        Self::UnreadableFragment {
            flow_id: flow_id.clone(),
            reason: reason.into(),
        }
    }

    /// The flow this error belongs to, for errors scoped to a single flow.
    pub fn flow_id(&self) -> Option<&FlowId> {
        match self {
            Self::MissingFlow { flow_id, .. } | Self::UnreadableFragment { flow_id, .. } => {
                Some(flow_id)
            }
            _ => None,
        }
    }

    /// Per-flow errors are the only ones an `ALL` run may skip past.
    pub fn is_per_flow(&self) -> bool {
        self.flow_id().is_some()
    }
}

impl FlowSelection {
    /// Decide what a per-flow failure means for this selection.
    ///
    /// `ALL` skips every per-flow failure. An explicit list of several
    /// flows skips a flow whose file is missing but stops on an unreadable
    /// one. A single explicit flow never skips.
    pub fn absorb(&self, err: PipelineError) -> Result<SkippedFlow, PipelineError> {
        let tolerated = match (self, &err) {
            (Self::All, _) => true,
            (Self::Explicit(ids), PipelineError::MissingFlow { .. }) => ids.len() > 1,
            (Self::Explicit(_), _) => false,
        };
        match err.flow_id() {
            Some(flow_id) if tolerated => Ok(SkippedFlow {
                flow_id: flow_id.clone(),
                reason: err.to_string(),
            }),
            _ => Err(err),
        }
    }
}
