//! Domain types: flows, fragments, typed observations, long and wide tables.

pub mod diagnostics;
pub mod flow;
pub mod fragment;
pub mod ids;
pub mod observation;
pub mod table;

pub use diagnostics::{FragmentDiagnostics, RunDiagnostics, SkippedFlow};
pub use flow::{Flow, FlowSelection};
pub use fragment::{RawFragment, RawRow};
pub use ids::FlowId;
pub use observation::{columns, Observation, TypedFragment};
pub use table::{LongRow, LongTable, WideRow, WideTable};
