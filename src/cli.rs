use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::formula::EvaluationMode;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Inspect sales workbooks: normalized records, column analysis and totals",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the purchase records found in a workbook
    Records(RecordsArgs),
    /// Profile every column of a workbook's data rows
    Analyze(AnalyzeArgs),
    /// Print the full analysis report with sales totals
    Summary(SummaryArgs),
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub struct WorkbookArgs {
    /// Input workbook (.xlsx); only the first sheet is read
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// YAML file with ingestion options
    #[arg(long = "options")]
    pub options: Option<PathBuf>,
    /// How formula cells are valued
    #[arg(long, value_enum)]
    pub evaluation: Option<EvaluationMode>,
    /// Treat sparse rows with large totals at the bottom as summary rows
    #[arg(long = "legacy-summary")]
    pub legacy_summary: bool,
}

#[derive(Debug, Args)]
pub struct RecordsArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,
    /// Emit records as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,
    /// Emit the analysis as JSON instead of a table
    #[arg(long)]
    pub json: bool,
    /// Maximum sample values kept per column
    #[arg(long)]
    pub samples: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,
    /// Emit the sales totals as JSON instead of the text report
    #[arg(long)]
    pub json: bool,
}
