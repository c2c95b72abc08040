//! tidypanel runner: configuration, flow lists and pipeline orchestration.
//!
//! This crate builds on `tidypanel-core` to provide:
//! - TOML run configuration with defaults for every field
//! - Flow lists from `.txt`, `.json` or `.csv` files
//! - The [`Pipeline`]: per-flow read + coercion (optionally on rayon),
//!   consolidation, pivot, output writing, cancellation and diagnostics

pub mod config;
pub mod flow_list;
pub mod pipeline;

pub use config::{ConfigError, InputConfig, PipelineConfig};
pub use flow_list::read_flows_from_file;
pub use pipeline::{
    consolidate, CancelToken, ConsolidationResult, Pipeline, RunError, RunReport,
};
