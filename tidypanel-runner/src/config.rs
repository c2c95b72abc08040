//! Serializable run configuration.
//!
//! Every field has a default, so an empty TOML file is a valid config:
//! all flows under `./data`, auto-detected encoding, `,` delimiter,
//! `.` decimals, duplicates rejected, Parquet long + wide into `./catalog`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tidypanel_core::data::{
    CoercionOptions, DateWindow, DuplicatePolicy, Locale, OutputFormats, ReaderOptions,
    RenameTable, TextEncoding,
};
use tidypanel_core::domain::FlowSelection;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("flow list {}: {reason}", path.display())]
    FlowList { path: PathBuf, reason: String },
}

/// How input files are decoded and split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub encoding: TextEncoding,
    pub delimiter: char,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Auto,
            delimiter: ',',
        }
    }
}

/// Full configuration of one consolidation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Project root holding the data and catalog directories.
    pub root: PathBuf,
    pub data_subdir: String,
    pub catalog_subdir: String,
    pub flows: FlowSelection,
    pub input: InputConfig,
    pub locale: Locale,
    pub renames: RenameTable,
    pub window: DateWindow,
    pub duplicates: DuplicatePolicy,
    pub outputs: OutputFormats,
    /// Read and coerce flows on the rayon pool.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            data_subdir: "data".to_string(),
            catalog_subdir: "catalog".to_string(),
            flows: FlowSelection::All,
            input: InputConfig::default(),
            locale: Locale::default(),
            renames: RenameTable::default(),
            window: DateWindow::default(),
            duplicates: DuplicatePolicy::default(),
            outputs: OutputFormats::default(),
            parallel: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults rooted at `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(format!("serialize: {e}")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_subdir.trim().is_empty() {
            return Err(ConfigError::Invalid("data_subdir is empty".into()));
        }
        if self.catalog_subdir.trim().is_empty() {
            return Err(ConfigError::Invalid("catalog_subdir is empty".into()));
        }
        self.delimiter()?;
        self.locale.validate().map_err(ConfigError::Invalid)?;
        if let (Some(start), Some(end)) = (self.window.start, self.window.end) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "window start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }

    fn delimiter(&self) -> Result<u8, ConfigError> {
        let c = self.input.delimiter;
        match u8::try_from(c) {
            Ok(b) if c.is_ascii() && !matches!(c, '"' | '\n' | '\r') => Ok(b),
            _ => Err(ConfigError::Invalid(format!(
                "delimiter {c:?} must be a single ASCII character other than a quote or newline"
            ))),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(&self.data_subdir)
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.root.join(&self.catalog_subdir)
    }

    pub fn reader_options(&self) -> Result<ReaderOptions, ConfigError> {
        Ok(ReaderOptions {
            data_subdir: self.data_subdir.clone(),
            encoding: self.input.encoding,
            delimiter: self.delimiter()?,
        })
    }

    pub fn coercion_options(&self) -> CoercionOptions {
        CoercionOptions {
            locale: self.locale.clone(),
            renames: self.renames.clone(),
            window: self.window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn empty_toml_is_default() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.outputs.parquet_long && config.outputs.parquet_wide);
        assert!(!config.outputs.csv_long && !config.outputs.csv_wide);
        assert_eq!(config.duplicates, DuplicatePolicy::Reject);
        assert!(config.flows.is_all());
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_config() {
        let config = PipelineConfig::from_toml(
            r#"
            root = "/srv/panel"
            flows = ["IPC", "TRM"]
            duplicates = "keep_last"
            parallel = true

            [input]
            encoding = "latin-1"
            delimiter = ";"

            [locale]
            decimal_separator = ","
            thousands_separator = "."

            [renames.global]
            Fecha_Corte = "date"

            [renames.flows.TRM]
            Valor_TRM = "value"

            [window]
            start = "2015-01-01"

            [outputs]
            csv_wide = true
            parquet_wide = false
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog_dir(), PathBuf::from("/srv/panel/catalog"));
        assert_eq!(config.flows, FlowSelection::parse("IPC,TRM"));
        assert_eq!(config.duplicates, DuplicatePolicy::KeepLast);
        assert_eq!(config.input.encoding, TextEncoding::Latin1);
        assert_eq!(config.reader_options().unwrap().delimiter, b';');
        assert_eq!(config.locale.decimal_separator, ',');
        assert_eq!(
            config.window.start,
            Some(NaiveDate::from_ymd_opt(2015, 1, 1).unwrap())
        );
        assert!(config.outputs.csv_wide && config.outputs.parquet_long);
        assert!(!config.outputs.parquet_wide);
        assert_eq!(config.renames.flows["TRM"]["Valor_TRM"], "value");
        config.validate().unwrap();
    }

    #[test]
    fn flows_accepts_all_string() {
        let config = PipelineConfig::from_toml(r#"flows = "all""#).unwrap();
        assert!(config.flows.is_all());
    }

    #[test]
    fn rejects_inverted_window() {
        let mut config = PipelineConfig::default();
        config.window.start = NaiveDate::from_ymd_opt(2021, 1, 1);
        config.window.end = NaiveDate::from_ymd_opt(2020, 1, 1);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_non_ascii_delimiter() {
        let mut config = PipelineConfig::default();
        config.input.delimiter = '§';
        assert!(config.validate().is_err());
        config.input.delimiter = '\t';
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_same_separators() {
        let mut config = PipelineConfig::default();
        config.locale.thousands_separator = Some('.');
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let mut config = PipelineConfig::for_root("/tmp/x");
        config.flows = FlowSelection::parse("A,B");
        config.parallel = true;
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }
}
