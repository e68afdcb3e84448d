use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about = "Profile the data quality of CSV files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the shape, inferred types and a preview of a dataset
    Summary(SummaryArgs),
    /// Report missing values per column and flag incomplete rows
    Completeness(CompletenessArgs),
    /// Report distinct values, duplication and value frequencies
    Cardinality(CardinalityArgs),
    /// Summarize numeric spreads and categorical frequencies
    Distribution(DistributionArgs),
    /// Validate columns against patterns, ranges and row expressions
    Correctness(CorrectnessArgs),
    /// Compare two snapshots of a dataset
    Diff(DiffArgs),
}

/// Options shared by every command that reads a dataset.
#[derive(Debug, Clone, Args)]
pub struct ReadOptions {
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML configuration file with thresholds and rules
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Report format written to stdout
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Input CSV file to profile
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of rows to preview
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    #[command(flatten)]
    pub read: ReadOptions,
}

#[derive(Debug, Args)]
pub struct CompletenessArgs {
    /// Input CSV file to profile
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Flag rows whose filled-cell percentage is below this value
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Write the flagged rows to this CSV file
    #[arg(long = "export-rows")]
    pub export_rows: Option<PathBuf>,
    #[command(flatten)]
    pub read: ReadOptions,
}

#[derive(Debug, Args)]
pub struct CardinalityArgs {
    /// Input CSV file to profile
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// List value frequencies for this column
    #[arg(long = "values")]
    pub values: Option<String>,
    /// Maximum number of values listed by --values
    #[arg(long)]
    pub top: Option<usize>,
    /// Write repeated rows (first occurrences excluded) to this CSV file
    #[arg(long = "export-duplicates")]
    pub export_duplicates: Option<PathBuf>,
    /// Write the dataset without repeated rows to this CSV file
    #[arg(long = "export-deduplicated")]
    pub export_deduplicated: Option<PathBuf>,
    #[command(flatten)]
    pub read: ReadOptions,
}

#[derive(Debug, Args)]
pub struct DistributionArgs {
    /// Input CSV file to profile
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Restrict the report to this comma-separated list of columns
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Number of histogram buckets for numeric columns
    #[arg(long)]
    pub buckets: Option<usize>,
    /// Number of categories listed before the remainder is grouped as Other
    #[arg(long)]
    pub top: Option<usize>,
    /// Which kinds of columns to report
    #[arg(long, value_enum, default_value = "all")]
    pub view: DistributionView,
    #[command(flatten)]
    pub read: ReadOptions,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum DistributionView {
    Numeric,
    Categorical,
    #[default]
    All,
}

#[derive(Debug, Args)]
pub struct CorrectnessArgs {
    /// Input CSV file to validate
    #[arg(short = 'i', long = "input", required_unless_present = "list_presets")]
    pub input: Option<PathBuf>,
    /// Column rule such as `postcode=pattern:^\d{5}$`, `age=range:0..120`,
    /// `email=preset:email` or `joined=date-range:2020-01-01..`
    #[arg(long = "rule", action = clap::ArgAction::Append)]
    pub rules: Vec<String>,
    /// Row-level boolean expression; rows where it is false fail
    #[arg(long = "expr")]
    pub expression: Option<String>,
    /// Count missing cells as failures
    #[arg(long = "blank-invalid")]
    pub blank_invalid: bool,
    /// Write failing rows to this CSV file
    #[arg(long = "export")]
    pub export: Option<PathBuf>,
    /// List the named preset patterns and exit
    #[arg(long = "presets")]
    pub list_presets: bool,
    #[command(flatten)]
    pub read: ReadOptions,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Baseline (older) CSV file
    #[arg(short = 'i', long = "old", visible_alias = "input")]
    pub old: PathBuf,
    /// Newer CSV file compared against the baseline
    #[arg(long = "new")]
    pub new: PathBuf,
    /// Row key column(s); omit for a key-free row comparison
    #[arg(short = 'k', long = "key", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub key: Vec<String>,
    /// Write rows only present in the new file to this CSV file
    #[arg(long = "export-added")]
    pub export_added: Option<PathBuf>,
    /// Write rows only present in the old file to this CSV file
    #[arg(long = "export-removed")]
    pub export_removed: Option<PathBuf>,
    /// Write changed cells (key, column, before, after) to this CSV file
    #[arg(long = "export-updated")]
    pub export_updated: Option<PathBuf>,
    #[command(flatten)]
    pub read: ReadOptions,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
