//! Pipeline orchestration: resolve flows, read and coerce each one,
//! consolidate, pivot, write.
//!
//! Per-flow work runs sequentially through the reader's lazy fragment
//! iterator, or on the rayon pool when `parallel` is set. Either way the
//! typed fragments are collected in selection order before consolidation,
//! so both modes give identical tables.

use crate::config::{ConfigError, PipelineConfig};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tidypanel_core::data::{
    pivot, Coerce, CoercionEngine, Consolidator, FragmentReader, OutputWriter,
};
use tidypanel_core::domain::{FlowSelection, LongTable, RunDiagnostics, TypedFragment, WideTable};
use tidypanel_core::PipelineError;
use tracing::{debug, info, warn};

/// Errors from building or running a pipeline.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Cooperative cancellation, checked between flows.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Output of one run, owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationResult {
    pub long: LongTable,
    pub wide: WideTable,
    pub diagnostics: RunDiagnostics,
}

/// A run that also wrote its outputs.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: ConsolidationResult,
    pub catalog_dir: PathBuf,
    /// Written files in write order (the manifest last).
    pub written: Vec<PathBuf>,
}

/// A configured pipeline. Holds no state between runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    reader: FragmentReader,
    engine: CoercionEngine,
    cancel: CancelToken,
}

impl Pipeline {
    /// Validate `config` and build the reader and coercion engine from it.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let reader = FragmentReader::new(&config.root, config.reader_options()?);
        let engine = CoercionEngine::new(config.coercion_options());
        Ok(Self {
            config,
            reader,
            engine,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn reader(&self) -> &FragmentReader {
        &self.reader
    }

    /// Build the long and wide tables in memory. Writes nothing.
    pub fn consolidate(&self) -> Result<ConsolidationResult, PipelineError> {
        let selection = &self.config.flows;
        let mut diagnostics = RunDiagnostics::default();

        let typed = if self.config.parallel {
            self.load_parallel(selection, &mut diagnostics)?
        } else {
            self.load_sequential(selection, &mut diagnostics)?
        };

        if typed.is_empty() {
            return Err(PipelineError::NoFlows {
                dir: self.reader.data_dir(),
            });
        }
        for fragment in &typed {
            diagnostics.record_fragment(&fragment.flow_id, fragment.diagnostics);
        }

        let consolidated = Consolidator::new(self.config.duplicates).consolidate(typed)?;
        diagnostics.replaced_duplicates = consolidated.replaced;
        let long = consolidated.table;
        let wide = pivot(&long)?;

        info!(
            flows = wide.flows.len(),
            long_rows = long.len(),
            wide_rows = wide.len(),
            skipped = diagnostics.skipped.len(),
            "consolidation complete"
        );
        Ok(ConsolidationResult {
            long,
            wide,
            diagnostics,
        })
    }

    /// Consolidate, then write the configured outputs into the catalog
    /// directory. A cancelled run writes nothing.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        let result = self.consolidate()?;
        self.write(result)
    }

    /// Write a finished consolidation, unless the run was cancelled meanwhile.
    fn write(&self, result: ConsolidationResult) -> Result<RunReport, PipelineError> {
        if self.cancel.is_cancelled() {
            let total = result.diagnostics.resolved_flows;
            return Err(PipelineError::Cancelled {
                completed: total,
                total,
            });
        }

        let catalog_dir = self.config.catalog_dir();
        let writer = OutputWriter::new(&catalog_dir, self.config.outputs);
        let written = writer.write(&result.long, &result.wide)?;
        info!(files = written.len(), dir = %catalog_dir.display(), "outputs written");
        Ok(RunReport {
            result,
            catalog_dir,
            written,
        })
    }

    fn load_sequential(
        &self,
        selection: &FlowSelection,
        diagnostics: &mut RunDiagnostics,
    ) -> Result<Vec<TypedFragment>, PipelineError> {
        let mut fragments = self.reader.fragments(selection)?;
        let total = fragments.total();
        diagnostics.resolved_flows = total;
        info!(flows = total, "reading flows");

        let mut typed = Vec::with_capacity(total);
        let mut completed = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { completed, total });
            }
            let Some(raw) = fragments.next() else { break };
            let raw = raw?;
            completed += 1;
            match raw.coerce(&self.engine) {
                Ok(fragment) => typed.push(fragment),
                Err(err) => {
                    let skipped = selection.absorb(err)?;
                    warn!(flow = %skipped.flow_id, reason = %skipped.reason, "skipping flow");
                    diagnostics.record_skip(skipped);
                }
            }
        }

        for skipped in fragments.into_skipped() {
            diagnostics.record_skip(skipped);
        }
        Ok(typed)
    }

    fn load_parallel(
        &self,
        selection: &FlowSelection,
        diagnostics: &mut RunDiagnostics,
    ) -> Result<Vec<TypedFragment>, PipelineError> {
        let resolution = self.reader.resolve(selection)?;
        for skipped in resolution.skipped {
            diagnostics.record_skip(skipped);
        }
        let flows = resolution.flows;
        let total = flows.len();
        diagnostics.resolved_flows = total;
        info!(flows = total, threads = rayon::current_num_threads(), "reading flows in parallel");

        let completed = AtomicUsize::new(0);
        let outcomes: Vec<Option<Result<TypedFragment, PipelineError>>> = flows
            .par_iter()
            .map(|flow| {
                if self.cancel.is_cancelled() {
                    return None;
                }
                let outcome = self
                    .reader
                    .read_flow(flow)
                    .and_then(|raw| raw.coerce(&self.engine));
                completed.fetch_add(1, Ordering::Relaxed);
                Some(outcome)
            })
            .collect();

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                completed: completed.into_inner(),
                total,
            });
        }

        let mut typed = Vec::with_capacity(total);
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                Ok(fragment) => typed.push(fragment),
                Err(err) => {
                    let skipped = selection.absorb(err)?;
                    warn!(flow = %skipped.flow_id, reason = %skipped.reason, "skipping flow");
                    diagnostics.record_skip(skipped);
                }
            }
        }
        debug!(loaded = typed.len(), "parallel load finished");
        Ok(typed)
    }
}

/// Consolidate the flows under `{root}/data` with default settings.
/// Returns the tables in memory and writes nothing.
pub fn consolidate(
    root: impl AsRef<Path>,
    selection: FlowSelection,
) -> Result<ConsolidationResult, RunError> {
    let config = PipelineConfig {
        flows: selection,
        ..PipelineConfig::for_root(root.as_ref())
    };
    Ok(Pipeline::new(config)?.consolidate()?)
}
