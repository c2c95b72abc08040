//! tidypanel CLI: consolidate per-flow CSV files into long and wide tables.
//!
//! Commands:
//! - `consolidate`: read `<root>/data/*.csv`, write the catalog under `<root>/catalog`
//! - `flows`: list the flows available under the data directory

mod logging;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use logging::{init_logging, LogConfig, LogFormat};
use std::path::PathBuf;
use tidypanel_core::data::{DuplicatePolicy, FragmentReader, TextEncoding};
use tidypanel_core::domain::FlowSelection;
use tidypanel_runner::{read_flows_from_file, Pipeline, PipelineConfig, RunReport};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "tidypanel",
    version,
    about = "tidypanel: merge per-flow CSV fragments into tidy and wide tables"
)]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Less log output (-q warnings only, -qq errors only).
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "verbose")]
    quiet: u8,

    /// Log format.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consolidate flows into long/wide tables and write them to the catalog.
    Consolidate(ConsolidateArgs),
    /// List the flows available under the data directory.
    Flows {
        /// Project root. Defaults to the config's root, else the current directory.
        #[arg(long, alias = "out-dir")]
        root: Option<PathBuf>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ConsolidateArgs {
    /// Project root holding data/ and catalog/.
    #[arg(long, alias = "out-dir")]
    root: Option<PathBuf>,

    /// Path to a TOML config file. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// ALL, or a comma-separated list of flow ids.
    #[arg(long, conflicts_with = "flows_from_file")]
    flows: Option<String>,

    /// File listing flow ids (.txt, .json, or CSV with a flow_id column).
    #[arg(long)]
    flows_from_file: Option<PathBuf>,

    /// Write long.parquet (true/false).
    #[arg(long)]
    save_parquet_long: Option<bool>,

    /// Write wide.parquet (true/false).
    #[arg(long)]
    save_parquet_wide: Option<bool>,

    /// Write long.csv (true/false).
    #[arg(long)]
    save_csv_long: Option<bool>,

    /// Write wide.csv (true/false).
    #[arg(long)]
    save_csv_wide: Option<bool>,

    /// Decimal separator for value cells.
    #[arg(long)]
    decimal: Option<char>,

    /// Thousands separator for value cells.
    #[arg(long)]
    thousands: Option<char>,

    /// Extra chrono date format, e.g. %d/%m/%Y. Repeatable.
    #[arg(long = "date-format")]
    date_formats: Vec<String>,

    /// Input encoding: auto, utf-8, latin-1.
    #[arg(long)]
    encoding: Option<String>,

    /// Field delimiter of the input files.
    #[arg(long)]
    delimiter: Option<char>,

    /// Duplicate (flow, date) policy: reject or keep-last.
    #[arg(long)]
    duplicates: Option<String>,

    /// Drop observations before this date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// Drop observations after this date (YYYY-MM-DD).
    #[arg(long)]
    end: Option<String>,

    /// Read and coerce flows in parallel.
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Build the tables and print the summary without writing files.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbosity(cli.verbose, cli.quiet).with_format(cli.log_format));

    match cli.command {
        Commands::Consolidate(args) => run_consolidate(args),
        Commands::Flows { root, config } => run_flows(root, config),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("--{flag} expects YYYY-MM-DD, got '{value}'"))
}

/// Config file first, then command-line overrides.
fn build_config(args: &ConsolidateArgs) -> Result<PipelineConfig> {
    let mut config = load_config(args.config.as_ref())?;

    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if let Some(flows) = &args.flows {
        config.flows = FlowSelection::parse(flows);
    }
    if let Some(path) = &args.flows_from_file {
        config.flows = read_flows_from_file(path)?;
    }

    let outputs = &mut config.outputs;
    for (flag, target) in [
        (args.save_parquet_long, &mut outputs.parquet_long),
        (args.save_parquet_wide, &mut outputs.parquet_wide),
        (args.save_csv_long, &mut outputs.csv_long),
        (args.save_csv_wide, &mut outputs.csv_wide),
    ] {
        if let Some(on) = flag {
            *target = on;
        }
    }

    if let Some(decimal) = args.decimal {
        config.locale.decimal_separator = decimal;
    }
    if let Some(thousands) = args.thousands {
        config.locale.thousands_separator = Some(thousands);
    }
    config
        .locale
        .date_formats
        .extend(args.date_formats.iter().cloned());

    if let Some(encoding) = &args.encoding {
        config.input.encoding = encoding
            .parse::<TextEncoding>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(delimiter) = args.delimiter {
        config.input.delimiter = delimiter;
    }
    if let Some(duplicates) = &args.duplicates {
        config.duplicates = duplicates
            .parse::<DuplicatePolicy>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(start) = &args.start {
        config.window.start = Some(parse_date("start", start)?);
    }
    if let Some(end) = &args.end {
        config.window.end = Some(parse_date("end", end)?);
    }
    if args.parallel {
        config.parallel = true;
    }

    Ok(config)
}

fn run_consolidate(args: ConsolidateArgs) -> Result<()> {
    let config = build_config(&args)?;
    if !args.dry_run && !config.outputs.any() {
        bail!("every output is disabled; enable one of the --save-* flags or use --dry-run");
    }

    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    info!(root = %pipeline.config().root.display(), "starting consolidation");

    if args.dry_run {
        let result = pipeline.consolidate()?;
        let report = RunReport {
            catalog_dir: pipeline.config().catalog_dir(),
            result,
            written: Vec::new(),
        };
        print_summary(&report);
        return Ok(());
    }

    let report = pipeline.run()?;
    print_summary(&report);
    Ok(())
}

fn run_flows(root: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_path.as_ref())?;
    if let Some(root) = root {
        config.root = root;
    }
    config.validate()?;

    let reader = FragmentReader::new(&config.root, config.reader_options()?);
    let flows = reader.list_available_flows()?;
    if flows.is_empty() {
        println!("No flows in {}", reader.data_dir().display());
        return Ok(());
    }

    println!("Data directory: {}", reader.data_dir().display());
    println!("Flows: {}", flows.len());
    println!();
    for flow in &flows {
        let size = std::fs::metadata(reader.flow_path(flow))
            .map(|m| m.len())
            .unwrap_or(0);
        println!("  {:<40} {:>10}", flow.as_str(), format_size(size));
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    let long = &report.result.long;
    let wide = &report.result.wide;
    let diagnostics = &report.result.diagnostics;

    println!();
    println!("=== Consolidation Summary ===");
    println!("Flows:        {}", wide.flows.len());
    println!("Long rows:    {}", long.len());
    println!("Wide rows:    {}", wide.len());
    match long.date_range() {
        Some((start, end)) => println!("Date range:   {start} to {end}"),
        None => println!("Date range:   (empty)"),
    }
    println!("Null values:  {}", long.rows.iter().filter(|r| r.value.is_none()).count());
    if !long.metadata_columns.is_empty() {
        println!("Metadata:     {}", long.metadata_columns.join(", "));
    }

    if !diagnostics.is_clean() {
        println!();
        println!("--- Diagnostics ---");
        for line in diagnostics.summary_lines() {
            println!("  {line}");
        }
    }

    println!();
    if report.written.is_empty() {
        println!("Nothing written (dry run).");
    } else {
        println!("Written to {}:", report.catalog_dir.display());
        for path in &report.written {
            println!("  {}", path.display());
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
