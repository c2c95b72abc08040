//! Raw fragment reader: one CSV file per flow under `{root}/{data_subdir}`.
//!
//! In `ALL` mode a flow whose file is unreadable or empty is skipped with a
//! warning and the remaining flows continue. An explicit list skips a flow
//! with no file but stops on an unreadable one; a single explicit flow must
//! exist and parse.

use super::error::PipelineError;
use crate::domain::{Flow, FlowId, FlowSelection, RawFragment, SkippedFlow};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Text encoding of the input CSV files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    /// Follow a byte-order mark when present, else UTF-8, falling back to
    /// Latin-1 when the bytes are not valid UTF-8.
    #[default]
    Auto,
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    /// ISO-8859-1, read as its Windows-1252 superset so `0x80..=0x9F`
    /// decode to `€`, curly quotes and dashes.
    #[serde(rename = "latin-1", alias = "latin1")]
    Latin1,
}

impl TextEncoding {
    /// Decode file bytes. A UTF-8 BOM is stripped.
    pub fn decode(self, bytes: &[u8]) -> Result<String, String> {
        match self {
            Self::Utf8 => {
                let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
                if had_errors {
                    return Err("invalid UTF-8".to_string());
                }
                Ok(text.into_owned())
            }
            Self::Latin1 => Ok(WINDOWS_1252
                .decode_without_bom_handling(bytes)
                .0
                .into_owned()),
            Self::Auto => {
                if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
                    let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
                    return Ok(text.into_owned());
                }
                let (text, had_errors) = UTF_8.decode_without_bom_handling(bytes);
                if had_errors {
                    debug!("input is not valid UTF-8, decoding as Latin-1");
                    return Ok(WINDOWS_1252
                        .decode_without_bom_handling(bytes)
                        .0
                        .into_owned());
                }
                Ok(text.into_owned())
            }
        }
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            other => Err(format!(
                "unknown encoding '{other}'. Valid: auto, utf-8, latin-1"
            )),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
        };
        f.write_str(name)
    }
}

/// How the reader finds and parses flow files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    pub data_subdir: String,
    pub encoding: TextEncoding,
    pub delimiter: u8,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            data_subdir: "data".to_string(),
            encoding: TextEncoding::Auto,
            delimiter: b',',
        }
    }
}

/// Reads raw per-flow fragments from the data directory.
#[derive(Debug, Clone)]
pub struct FragmentReader {
    root: PathBuf,
    options: ReaderOptions,
}

impl FragmentReader {
    pub fn new(root: impl Into<PathBuf>, options: ReaderOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{data_subdir}`
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(&self.options.data_subdir)
    }

    /// `{data_dir}/{flow_id}.csv`
    pub fn flow_path(&self, flow_id: &FlowId) -> PathBuf {
        self.data_dir().join(format!("{flow_id}.csv"))
    }

    /// Flow ids of every `*.csv` file in the data directory, sorted.
    /// A missing data directory yields an empty list.
    pub fn list_available_flows(&self) -> Result<Vec<FlowId>, PipelineError> {
        let dir = self.data_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PipelineError::io(&dir, e)),
        };

        let mut flows = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| PipelineError::io(&dir, e))?.path();
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
            if !is_csv || !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                flows.push(FlowId::new(stem));
            }
        }
        flows.sort();
        debug!(count = flows.len(), dir = %dir.display(), "listed available flows");
        Ok(flows)
    }

    /// Turn a selection into concrete flows, before any file is read.
    ///
    /// Flows without a file, or with a reserved id, go through
    /// [`FlowSelection::absorb`]: skipped where the selection tolerates it,
    /// an error otherwise. No flow left is [`PipelineError::NoFlows`].
    pub fn resolve(&self, selection: &FlowSelection) -> Result<Resolution, PipelineError> {
        let candidates: Vec<FlowId> = match selection {
            FlowSelection::All => self.list_available_flows()?,
            FlowSelection::Explicit(ids) => ids.clone(),
        };

        let mut resolution = Resolution::default();
        for id in candidates {
            let flow = Flow {
                path: self.flow_path(&id),
                id,
            };
            match self.check_flow(&flow) {
                Ok(()) => resolution.flows.push(flow),
                Err(err) => {
                    let skipped = selection.absorb(err)?;
                    warn!(flow = %skipped.flow_id, reason = %skipped.reason, "skipping flow");
                    resolution.skipped.push(skipped);
                }
            }
        }

        if resolution.flows.is_empty() {
            return Err(PipelineError::NoFlows {
                dir: self.data_dir(),
            });
        }
        Ok(resolution)
    }

    fn check_flow(&self, flow: &Flow) -> Result<(), PipelineError> {
        if flow.id.is_reserved() {
            return Err(PipelineError::unreadable(
                &flow.id,
                format!("flow id '{}' is reserved for the wide table's date column", flow.id),
            ));
        }
        if !flow.path.is_file() {
            return Err(PipelineError::MissingFlow {
                flow_id: flow.id.clone(),
                path: flow.path.clone(),
            });
        }
        Ok(())
    }

    /// Read and parse one flow's CSV file.
    pub fn read_flow(&self, flow: &Flow) -> Result<RawFragment, PipelineError> {
        let bytes = fs::read(&flow.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::MissingFlow {
                flow_id: flow.id.clone(),
                path: flow.path.clone(),
            },
            _ => PipelineError::unreadable(&flow.id, format!("read failed: {e}")),
        })?;
        let text = self
            .options
            .encoding
            .decode(&bytes)
            .map_err(|reason| PipelineError::unreadable(&flow.id, reason))?;

        let fragment = parse_csv(&flow.id, &text, self.options.delimiter)?.with_source(&flow.path);
        debug!(
            flow = %flow.id,
            rows = fragment.len(),
            columns = fragment.headers.len(),
            "read fragment"
        );
        Ok(fragment)
    }

    /// Lazily read every selected flow, in selection order.
    ///
    /// Resolution happens up front, so a flow that cannot be skipped fails
    /// here before any file is read.
    pub fn fragments(&self, selection: &FlowSelection) -> Result<Fragments<'_>, PipelineError> {
        let resolution = self.resolve(selection)?;
        Ok(Fragments {
            reader: self,
            selection: selection.clone(),
            total: resolution.flows.len(),
            flows: resolution.flows.into_iter(),
            skipped: resolution.skipped,
        })
    }
}

/// What a selection resolved to: the flows to read, and the ones set aside
/// before reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub flows: Vec<Flow>,
    pub skipped: Vec<SkippedFlow>,
}

/// Iterator over the fragments of a selection. Failures the selection
/// tolerates are recorded in [`Fragments::skipped`] instead of yielded.
#[derive(Debug)]
pub struct Fragments<'a> {
    reader: &'a FragmentReader,
    selection: FlowSelection,
    total: usize,
    flows: std::vec::IntoIter<Flow>,
    skipped: Vec<SkippedFlow>,
}

impl Fragments<'_> {
    /// Number of flows the selection resolved to (skips at resolution
    /// excluded).
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn skipped(&self) -> &[SkippedFlow] {
        &self.skipped
    }

    pub fn into_skipped(self) -> Vec<SkippedFlow> {
        self.skipped
    }
}

impl Iterator for Fragments<'_> {
    type Item = Result<RawFragment, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let flow = self.flows.next()?;
            match self.reader.read_flow(&flow) {
                Ok(fragment) => return Some(Ok(fragment)),
                Err(err) => match self.selection.absorb(err) {
                    Ok(skipped) => {
                        warn!(flow = %skipped.flow_id, reason = %skipped.reason, "skipping flow");
                        self.skipped.push(skipped);
                    }
                    Err(err) => return Some(Err(err)),
                },
            }
        }
    }
}

/// Parse CSV text into a raw fragment. Blank header names become
/// `column_<n>`; all-blank records are dropped.
pub fn parse_csv(flow_id: &FlowId, text: &str, delimiter: u8) -> Result<RawFragment, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::unreadable(flow_id, format!("bad header: {e}")))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("column_{}", i + 1)
            } else {
                h.to_string()
            }
        })
        .collect();

    if headers.is_empty() {
        return Err(PipelineError::unreadable(flow_id, "empty file"));
    }

    let mut fragment = RawFragment::new(flow_id.clone(), headers);
    for record in reader.records() {
        let record = record.map_err(|e| PipelineError::unreadable(flow_id, format!("bad record: {e}")))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let line = record.position().map_or(0, csv::Position::line);
        fragment.push_row_at(line, record.iter().map(str::to_string).collect());
    }

    if fragment.is_empty() {
        return Err(PipelineError::unreadable(flow_id, "no data rows"));
    }
    Ok(fragment)
}
