//! tidypanel core: merges per-flow CSV fragments into a long (tidy) table
//! and a wide table.
//!
//! Stages:
//! - [`data::FragmentReader`] reads one CSV per flow from the data directory
//! - [`data::CoercionEngine`] renames columns and types dates, values and metadata
//! - [`data::Consolidator`] stacks typed fragments into a [`domain::LongTable`]
//! - [`data::pivot`] reshapes the long table into a [`domain::WideTable`]
//! - [`data::OutputWriter`] writes CSV/Parquet files and a manifest

pub mod data;
pub mod domain;

pub use data::PipelineError;
