//! Reading, coercion, consolidation, pivoting and output.

pub mod align;
pub mod canonicalize;
pub mod coerce;
pub mod error;
pub mod ingest;
pub mod locale;
pub mod manifest;
pub mod period;
pub mod rename;
pub mod schema;
pub mod writer;

pub use align::pivot;
pub use canonicalize::{Consolidated, Consolidator, DuplicatePolicy};
pub use coerce::{coerce_records, Coerce, CoercionEngine, CoercionOptions, DateWindow};
pub use error::PipelineError;
pub use ingest::{
    parse_csv, FragmentReader, Fragments, ReaderOptions, Resolution, TextEncoding,
};
pub use locale::{Locale, NumberCell};
pub use manifest::{content_hash, CatalogManifest, FlowSummary};
pub use period::{parse_date, parse_period};
pub use rename::{snake_case, RenameTable};
pub use schema::{LongSchema, SchemaError, WideSchema};
pub use writer::{
    file_name, read_long_parquet, read_wide_parquet, FileFormat, OutputFormats, OutputWriter,
    TableKind, MANIFEST_FILE,
};
