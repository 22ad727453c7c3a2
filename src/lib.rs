pub mod cell;
pub mod cli;
pub mod error;
pub mod formula;
pub mod header;
pub mod ingest;
pub mod options;
pub mod present;
pub mod record;
pub mod rows;
pub mod stats;
pub mod table;
pub mod workbook;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde_json::json;

use crate::{
    cli::{Cli, Commands, WorkbookArgs},
    ingest::{Ingestion, LogSink},
    options::{IngestOptions, SummaryDetection},
    present::SalesSummary,
    table::Align,
};

pub use crate::{
    error::IngestError,
    ingest::{analyze_workbook, ingest_workbook, read_workbook},
    record::PurchaseRecord,
    stats::{Analysis, ColumnInfo},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sales_sheet", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Records(args) => handle_records(&args),
        Commands::Analyze(args) => handle_analyze(&args),
        Commands::Summary(args) => handle_summary(&args),
    }
}

fn handle_records(args: &cli::RecordsArgs) -> Result<()> {
    let options = resolve_options(&args.workbook, None)?;
    let ingestion = ingest(&args.workbook, &options)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ingestion.records)?);
        return Ok(());
    }
    let headers = present::RECORD_HEADERS.map(String::from);
    table::print_aligned(
        &headers,
        &present::record_rows(&ingestion.records),
        &present::RECORD_ALIGNMENT,
    );
    Ok(())
}

fn handle_analyze(args: &cli::AnalyzeArgs) -> Result<()> {
    let options = resolve_options(&args.workbook, args.samples)?;
    let ingestion = ingest(&args.workbook, &options)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ingestion.analysis)?);
        return Ok(());
    }
    let headers = present::COLUMN_HEADERS.map(String::from);
    table::print_aligned(
        &headers,
        &present::column_rows(&ingestion.analysis),
        &[
            Align::Right,
            Align::Left,
            Align::Left,
            Align::Right,
            Align::Right,
            Align::Right,
        ],
    );
    Ok(())
}

fn handle_summary(args: &cli::SummaryArgs) -> Result<()> {
    let options = resolve_options(&args.workbook, None)?;
    let ingestion = ingest(&args.workbook, &options)?;
    if args.json {
        let summary = SalesSummary::from_records(&ingestion.records);
        let payload = json!({
            "summary": summary,
            "window": ingestion.window,
            "columns": ingestion.analysis.columns,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    print!(
        "{}",
        present::analysis_report(&ingestion.analysis, &ingestion.records)
    );
    Ok(())
}

/// Options file first, then command-line overrides.
fn resolve_options(args: &WorkbookArgs, samples: Option<usize>) -> Result<IngestOptions> {
    let mut options = match &args.options {
        Some(path) => IngestOptions::load(path)
            .with_context(|| format!("Loading ingestion options from {path:?}"))?,
        None => IngestOptions::default(),
    };
    if let Some(mode) = args.evaluation {
        options.evaluation = mode;
    }
    if args.legacy_summary {
        options.summary_detection = SummaryDetection::TrailingTotals;
    }
    if let Some(samples) = samples {
        ensure!(samples > 0, "--samples must be at least 1");
        options.max_samples_per_column = samples;
    }
    debug!("Ingestion options: {options:?}");
    Ok(options)
}

fn ingest(args: &WorkbookArgs, options: &IngestOptions) -> Result<Ingestion> {
    info!("Reading workbook '{}'", args.input.display());
    let ingestion = ingest_workbook(&args.input, options, &mut LogSink)
        .with_context(|| format!("Ingesting {:?}", args.input))?;
    info!(
        "Data rows {}..={} of sheet yielded {} record(s)",
        ingestion.window.first + 1,
        ingestion.window.last + 1,
        ingestion.records.len()
    );
    Ok(ingestion)
}
