//! Output writer for the consolidated tables.
//!
//! Layout: `{catalog_dir}/long.{csv,parquet}`, `{catalog_dir}/wide.{csv,parquet}`
//! and `{catalog_dir}/manifest.json`.
//!
//! Every output is rendered in memory first, so a table that cannot be
//! serialized fails the run before anything touches disk. The rendered
//! files are then staged as `{name}.tmp` and renamed into place only once
//! all of them are written; a failed stage removes every temp file and
//! leaves the existing catalog untouched.

use super::error::PipelineError;
use super::manifest::CatalogManifest;
use super::schema::{LongSchema, WideSchema};
use crate::domain::{columns, FlowId, LongRow, LongTable, WideRow, WideTable};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Which outputs to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFormats {
    pub csv_long: bool,
    pub csv_wide: bool,
    pub parquet_long: bool,
    pub parquet_wide: bool,
}

impl Default for OutputFormats {
    fn default() -> Self {
        Self {
            csv_long: false,
            csv_wide: false,
            parquet_long: true,
            parquet_wide: true,
        }
    }
}

impl OutputFormats {
    pub fn none() -> Self {
        Self {
            csv_long: false,
            csv_wide: false,
            parquet_long: false,
            parquet_wide: false,
        }
    }

    pub fn all() -> Self {
        Self {
            csv_long: true,
            csv_wide: true,
            parquet_long: true,
            parquet_wide: true,
        }
    }

    pub fn any(&self) -> bool {
        self.csv_long || self.csv_wide || self.parquet_long || self.parquet_wide
    }

    /// Enabled outputs, in write order.
    pub fn enabled(&self) -> Vec<(TableKind, FileFormat)> {
        [
            (self.csv_long, TableKind::Long, FileFormat::Csv),
            (self.csv_wide, TableKind::Wide, FileFormat::Csv),
            (self.parquet_long, TableKind::Long, FileFormat::Parquet),
            (self.parquet_wide, TableKind::Wide, FileFormat::Parquet),
        ]
        .into_iter()
        .filter(|(on, _, _)| *on)
        .map(|(_, kind, format)| (kind, format))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Long,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

/// `long.csv`, `wide.parquet`, ...
pub fn file_name(kind: TableKind, format: FileFormat) -> String {
    let stem = match kind {
        TableKind::Long => "long",
        TableKind::Wide => "wide",
    };
    format!("{stem}.{}", format.extension())
}

/// Writes long/wide tables into a catalog directory.
pub struct OutputWriter {
    catalog_dir: PathBuf,
    formats: OutputFormats,
}

impl OutputWriter {
    pub fn new(catalog_dir: impl Into<PathBuf>, formats: OutputFormats) -> Self {
        Self {
            catalog_dir: catalog_dir.into(),
            formats,
        }
    }

    pub fn catalog_dir(&self) -> &Path {
        &self.catalog_dir
    }

    pub fn formats(&self) -> OutputFormats {
        self.formats
    }

    pub fn path(&self, kind: TableKind, format: FileFormat) -> PathBuf {
        self.catalog_dir.join(file_name(kind, format))
    }

    /// Write every enabled output plus the manifest. Returns the written
    /// paths in write order; nothing is written when no format is enabled.
    pub fn write(&self, long: &LongTable, wide: &WideTable) -> Result<Vec<PathBuf>, PipelineError> {
        let enabled = self.formats.enabled();
        if enabled.is_empty() {
            debug!("no output formats enabled, skipping write");
            return Ok(Vec::new());
        }

        let mut files = Vec::with_capacity(enabled.len() + 1);
        for (kind, format) in enabled {
            let bytes = match (kind, format) {
                (TableKind::Long, FileFormat::Csv) => long_to_csv(long)?,
                (TableKind::Wide, FileFormat::Csv) => wide_to_csv(wide)?,
                (TableKind::Long, FileFormat::Parquet) => {
                    parquet_bytes(&mut long_to_dataframe(long)?)?
                }
                (TableKind::Wide, FileFormat::Parquet) => {
                    parquet_bytes(&mut wide_to_dataframe(wide)?)?
                }
            };
            files.push((self.path(kind, format), bytes));
        }

        let names = files
            .iter()
            .filter_map(|(p, _)| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        let manifest = CatalogManifest::build(long, wide, names);
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| PipelineError::Manifest(format!("serialize: {e}")))?;
        files.push((self.catalog_dir.join(MANIFEST_FILE), json));

        fs::create_dir_all(&self.catalog_dir)
            .map_err(|e| PipelineError::io(&self.catalog_dir, e))?;
        commit(&files)?;

        let written: Vec<PathBuf> = files.into_iter().map(|(path, _)| path).collect();
        for path in &written {
            info!(path = %path.display(), "wrote output");
        }
        Ok(written)
    }
}

/// `{path}.tmp` next to the target.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Stage every file as `{name}.tmp`, then rename them all into place.
/// Any failure removes the temp files already created.
fn commit(files: &[(PathBuf, Vec<u8>)]) -> Result<(), PipelineError> {
    let mut staged: Vec<PathBuf> = Vec::with_capacity(files.len());
    for (path, bytes) in files {
        let tmp = tmp_path(path);
        let result = write_tmp(&tmp, bytes);
        staged.push(tmp);
        if let Err(err) = result {
            remove_staged(&staged);
            return Err(err);
        }
    }

    for ((path, _), tmp) in files.iter().zip(&staged) {
        if let Err(e) = fs::rename(tmp, path) {
            remove_staged(&staged);
            return Err(PipelineError::io(path, e));
        }
    }
    Ok(())
}

fn write_tmp(tmp: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let mut file = fs::File::create(tmp).map_err(|e| PipelineError::io(tmp, e))?;
    file.write_all(bytes).map_err(|e| PipelineError::io(tmp, e))?;
    file.sync_all().map_err(|e| PipelineError::io(tmp, e))
}

fn remove_staged(staged: &[PathBuf]) {
    for tmp in staged {
        // Already renamed or never created.
        let _ = fs::remove_file(tmp);
    }
}

fn parquet_bytes(df: &mut DataFrame) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(df)
        .map_err(|e| PipelineError::Parquet(format!("write parquet: {e}")))?;
    Ok(buf)
}

// ── Date helpers ────────────────────────────────────────────────────

pub(crate) fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

pub(crate) fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(EPOCH_DAYS_FROM_CE)?)
}

// ── DataFrame conversion ────────────────────────────────────────────

fn date_column(dates: Vec<i32>) -> Result<Column, PipelineError> {
    Column::new(columns::DATE.into(), dates)
        .cast(&DataType::Date)
        .map_err(|e| PipelineError::Parquet(format!("date cast: {e}")))
}

/// Long table as a typed DataFrame: `date` is `Date`, `value` is `Float64`,
/// every other column is `String`.
pub fn long_to_dataframe(long: &LongTable) -> Result<DataFrame, PipelineError> {
    let rows = &long.rows;
    let flow_ids: Vec<&str> = rows.iter().map(|r| r.flow_id.as_str()).collect();
    let dates: Vec<i32> = rows.iter().map(|r| days_since_epoch(r.date)).collect();
    let times: Vec<Option<&str>> = rows.iter().map(|r| r.time.as_deref()).collect();
    let values: Vec<Option<f64>> = rows.iter().map(|r| r.value).collect();
    let units: Vec<Option<&str>> = rows.iter().map(|r| r.unit.as_deref()).collect();
    let names: Vec<Option<&str>> = rows.iter().map(|r| r.series_name.as_deref()).collect();

    let mut cols = vec![
        Column::new(columns::FLOW_ID.into(), flow_ids),
        date_column(dates)?,
        Column::new(columns::TIME.into(), times),
        Column::new(columns::VALUE.into(), values),
        Column::new(columns::UNIT.into(), units),
        Column::new(columns::SERIES_NAME.into(), names),
    ];
    for (i, name) in long.metadata_columns.iter().enumerate() {
        let cells: Vec<Option<&str>> = rows
            .iter()
            .map(|r| r.metadata.get(i).and_then(|c| c.as_deref()))
            .collect();
        cols.push(Column::new(name.as_str().into(), cells));
    }

    DataFrame::new(cols).map_err(|e| PipelineError::Parquet(format!("dataframe creation: {e}")))
}

/// Wide table as a DataFrame: `date` plus one `Float64` column per flow.
pub fn wide_to_dataframe(wide: &WideTable) -> Result<DataFrame, PipelineError> {
    check_wide_columns(wide)?;
    let dates: Vec<i32> = wide.rows.iter().map(|r| days_since_epoch(r.date)).collect();
    let mut cols = vec![date_column(dates)?];
    for (i, flow) in wide.flows.iter().enumerate() {
        let values: Vec<Option<f64>> = wide
            .rows
            .iter()
            .map(|r| r.values.get(i).copied().flatten())
            .collect();
        cols.push(Column::new(flow.as_str().into(), values));
    }

    DataFrame::new(cols).map_err(|e| PipelineError::Parquet(format!("dataframe creation: {e}")))
}

/// Every flow column must be distinct from `date`.
fn check_wide_columns(wide: &WideTable) -> Result<(), PipelineError> {
    match wide.flows.iter().find(|f| f.is_reserved()) {
        Some(flow) => Err(PipelineError::InvariantViolation(format!(
            "flow id '{flow}' collides with the wide table's date column"
        ))),
        None => Ok(()),
    }
}

fn read_parquet(path: &Path) -> Result<DataFrame, PipelineError> {
    let file = fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| PipelineError::Parquet(format!("read {}: {e}", path.display())))
}

/// Read a long table written by [`OutputWriter`].
pub fn read_long_parquet(path: &Path) -> Result<LongTable, PipelineError> {
    let df = read_parquet(path)?;
    LongSchema::validate(&df)?;
    dataframe_to_long(&df)
}

/// Read a wide table written by [`OutputWriter`].
pub fn read_wide_parquet(path: &Path) -> Result<WideTable, PipelineError> {
    let df = read_parquet(path)?;
    WideSchema::validate(&df)?;
    dataframe_to_wide(&df)
}

fn dataframe_to_long(df: &DataFrame) -> Result<LongTable, PipelineError> {
    let map_err = |e: PolarsError| PipelineError::Parquet(format!("column read: {e}"));

    let flow_ca = df.column(columns::FLOW_ID).map_err(map_err)?.str().map_err(map_err)?;
    let date_ca = df.column(columns::DATE).map_err(map_err)?.date().map_err(map_err)?;
    let time_ca = df.column(columns::TIME).map_err(map_err)?.str().map_err(map_err)?;
    let value_ca = df.column(columns::VALUE).map_err(map_err)?.f64().map_err(map_err)?;
    let unit_ca = df.column(columns::UNIT).map_err(map_err)?.str().map_err(map_err)?;
    let name_ca = df
        .column(columns::SERIES_NAME)
        .map_err(map_err)?
        .str()
        .map_err(map_err)?;

    let metadata_columns = LongSchema::metadata_columns(df);
    let mut metadata_cas = Vec::with_capacity(metadata_columns.len());
    for name in &metadata_columns {
        metadata_cas.push(df.column(name).map_err(map_err)?.str().map_err(map_err)?);
    }

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let flow_id = flow_ca
            .get(i)
            .ok_or_else(|| PipelineError::Parquet(format!("null flow_id at row {i}")))?;
        let date = read_date(date_ca.get(i), i)?;
        rows.push(LongRow {
            flow_id: FlowId::from(flow_id),
            date,
            value: value_ca.get(i),
            time: time_ca.get(i).map(str::to_string),
            unit: unit_ca.get(i).map(str::to_string),
            series_name: name_ca.get(i).map(str::to_string),
            metadata: metadata_cas
                .iter()
                .map(|ca| ca.get(i).map(str::to_string))
                .collect(),
        });
    }

    Ok(LongTable {
        metadata_columns,
        rows,
    })
}

fn dataframe_to_wide(df: &DataFrame) -> Result<WideTable, PipelineError> {
    let map_err = |e: PolarsError| PipelineError::Parquet(format!("column read: {e}"));

    let date_ca = df.column(columns::DATE).map_err(map_err)?.date().map_err(map_err)?;
    let flows = WideSchema::flow_columns(df);
    let mut value_cas = Vec::with_capacity(flows.len());
    for flow in &flows {
        value_cas.push(df.column(flow).map_err(map_err)?.f64().map_err(map_err)?);
    }

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        rows.push(WideRow {
            date: read_date(date_ca.get(i), i)?,
            values: value_cas.iter().map(|ca| ca.get(i)).collect(),
        });
    }

    Ok(WideTable {
        flows: flows.into_iter().map(FlowId::from).collect(),
        rows,
    })
}

fn read_date(days: Option<i32>, row: usize) -> Result<NaiveDate, PipelineError> {
    let days = days.ok_or_else(|| PipelineError::Parquet(format!("null date at row {row}")))?;
    date_from_days(days)
        .ok_or_else(|| PipelineError::Parquet(format!("date out of range at row {row}: {days}")))
}

// ── CSV rendering ───────────────────────────────────────────────────

fn csv_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Csv(e.to_string())
}

fn fmt_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Long table as CSV bytes: ISO dates, shortest round-trip floats, nulls empty.
pub fn long_to_csv(long: &LongTable) -> Result<Vec<u8>, PipelineError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    let mut header: Vec<&str> = LongSchema::FIXED_COLUMNS.to_vec();
    header.extend(long.metadata_columns.iter().map(String::as_str));
    wtr.write_record(&header).map_err(csv_err)?;

    for row in &long.rows {
        let mut record = vec![
            row.flow_id.to_string(),
            row.date.format("%Y-%m-%d").to_string(),
            row.time.clone().unwrap_or_default(),
            fmt_value(row.value),
            row.unit.clone().unwrap_or_default(),
            row.series_name.clone().unwrap_or_default(),
        ];
        record.extend(row.metadata.iter().map(|c| c.clone().unwrap_or_default()));
        wtr.write_record(&record).map_err(csv_err)?;
    }

    wtr.into_inner().map_err(csv_err)
}

/// Wide table as CSV bytes.
pub fn wide_to_csv(wide: &WideTable) -> Result<Vec<u8>, PipelineError> {
    check_wide_columns(wide)?;
    let mut wtr = csv::Writer::from_writer(Vec::new());
    let mut header = vec![columns::DATE];
    header.extend(wide.flows.iter().map(FlowId::as_str));
    wtr.write_record(&header).map_err(csv_err)?;

    for row in &wide.rows {
        let mut record = vec![row.date.format("%Y-%m-%d").to_string()];
        record.extend(row.values.iter().map(|v| fmt_value(*v)));
        wtr.write_record(&record).map_err(csv_err)?;
    }

    wtr.into_inner().map_err(csv_err)
}
