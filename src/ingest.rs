//! Workbook ingestion entry points.
//!
//! [`ingest_workbook()`] opens a workbook once and produces both the purchase
//! records and the column analysis over the same data window.
//! [`read_workbook()`] and [`analyze_workbook()`] return one side each.
//! Rows that cannot be turned into a record are reported to a
//! [`DiagnosticsSink`] and skipped.

use std::path::Path;

use log::{debug, info, warn};

use crate::{
    cell::CellReader,
    error::IngestError,
    header::{Field, HeaderMap},
    options::IngestOptions,
    record::{self, PurchaseRecord, RowOutcome, SkipReason},
    rows::{self, DataWindow},
    stats::{self, Analysis},
    workbook::{Sheet, Workbook},
};

/// A row that was left out of the records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based, as shown by spreadsheet applications.
    pub row: usize,
    pub message: String,
}

pub trait DiagnosticsSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the log at `warn` level.
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        warn!("Skipping row {}: {}", diagnostic.row, diagnostic.message);
    }
}

#[derive(Debug, Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsSink for CollectingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

#[derive(Debug, Clone)]
pub struct Ingestion {
    pub records: Vec<PurchaseRecord>,
    pub analysis: Analysis,
    pub window: DataWindow,
}

impl Ingestion {
    /// Runs extraction and analysis over an already loaded sheet. `None` when
    /// the sheet has no header row.
    pub fn from_sheet(
        sheet: &Sheet,
        options: &IngestOptions,
        sink: &mut dyn DiagnosticsSink,
    ) -> Option<Self> {
        let header_row = sheet.row(0)?;
        let header = HeaderMap::build(header_row);
        debug!("Header columns: {:?}", header.entries());
        for field in Field::ALL {
            if header.resolve(field.aliases()).is_none() {
                debug!("No column found for {field:?}");
            }
        }

        let evaluator = options.evaluation.evaluator();
        let reader = CellReader::new(sheet, evaluator.as_ref());
        let window = rows::classify(&reader, options.summary_detection);

        let mut records = Vec::new();
        for row in window.rows() {
            if rows::is_row_empty(&reader, row) {
                continue;
            }
            match record::extract(&reader, row, &header) {
                RowOutcome::Record(record) => records.push(record),
                RowOutcome::Skip(SkipReason::MissingItemName) => {
                    debug!("Row {} has no item name", row + 1);
                }
                RowOutcome::Skip(SkipReason::Malformed(message)) => sink.report(Diagnostic {
                    row: row + 1,
                    message,
                }),
            }
        }
        let analysis = stats::analyze(&reader, window, options.max_samples_per_column);
        Some(Self {
            records,
            analysis,
            window,
        })
    }
}

pub fn ingest_workbook(
    path: &Path,
    options: &IngestOptions,
    sink: &mut dyn DiagnosticsSink,
) -> Result<Ingestion, IngestError> {
    let workbook = Workbook::open(path)?;
    let ingestion = Ingestion::from_sheet(workbook.sheet(), options, sink).ok_or_else(|| {
        IngestError::NoHeader {
            path: workbook.path().to_path_buf(),
        }
    })?;
    info!(
        "Loaded {} record(s) and {} column(s) from {:?}",
        ingestion.records.len(),
        ingestion.analysis.columns.len(),
        path
    );
    Ok(ingestion)
}

pub fn read_workbook(
    path: &Path,
    options: &IngestOptions,
) -> Result<Vec<PurchaseRecord>, IngestError> {
    Ok(ingest_workbook(path, options, &mut LogSink)?.records)
}

pub fn analyze_workbook(path: &Path, options: &IngestOptions) -> Result<Analysis, IngestError> {
    Ok(ingest_workbook(path, options, &mut LogSink)?.analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{Cell, CellValue};

    fn sales_sheet() -> Sheet {
        let header = [
            "Sale Date",
            "Procuct Name",
            "Unit Price",
            "Qty Sold",
            "Customer Name",
            "Total Amount",
        ]
        .into_iter()
        .map(Cell::text)
        .collect();
        Sheet::from_rows(
            "Sales",
            vec![
                header,
                vec![
                    Cell::date(45306.0),
                    Cell::text("Widget"),
                    Cell::number(9.5),
                    Cell::number(3.0),
                    Cell::text("Acme"),
                    Cell::formula("C2*D2", CellValue::Number(28.5)),
                ],
                vec![
                    Cell::date(45307.0),
                    Cell::text("Crate"),
                    Cell::number(1.0),
                    Cell::number(5e9),
                    Cell::text("Bulk Co"),
                    Cell::number(5.0),
                ],
                vec![
                    Cell::date(45308.0),
                    Cell::blank(),
                    Cell::number(2.0),
                    Cell::number(1.0),
                    Cell::text("Nobody"),
                    Cell::number(2.0),
                ],
                vec![
                    Cell::blank(),
                    Cell::blank(),
                    Cell::blank(),
                    Cell::blank(),
                    Cell::blank(),
                    Cell::formula("SUM(F2:F4)", CellValue::Number(35.5)),
                ],
            ],
        )
    }

    #[test]
    fn malformed_rows_reach_the_sink_and_blank_names_do_not() {
        let mut sink = CollectingSink::default();
        let ingestion =
            Ingestion::from_sheet(&sales_sheet(), &IngestOptions::default(), &mut sink).unwrap();
        assert_eq!(ingestion.window, DataWindow { first: 1, last: 3 });
        assert_eq!(ingestion.records.len(), 1);
        assert_eq!(ingestion.records[0].item_name, "Widget");
        assert_eq!(sink.diagnostics.len(), 1);
        assert_eq!(sink.diagnostics[0].row, 3);
    }

    #[test]
    fn analysis_covers_the_same_window() {
        let ingestion =
            Ingestion::from_sheet(&sales_sheet(), &IngestOptions::default(), &mut LogSink).unwrap();
        let total = &ingestion.analysis.columns[5];
        assert_eq!(total.name, "Total Amount");
        assert_eq!(total.total_cells, 3);
        assert_eq!(total.sum, Some(35.5));
    }

    #[test]
    fn sheet_without_header_yields_nothing() {
        let sheet = Sheet::from_rows("Empty", Vec::new());
        assert!(Ingestion::from_sheet(&sheet, &IngestOptions::default(), &mut LogSink).is_none());
    }

    #[test]
    fn missing_workbook_is_unreadable() {
        let err = read_workbook(Path::new("no/such/book.xlsx"), &IngestOptions::default())
            .unwrap_err();
        assert!(matches!(err, IngestError::FileUnreadable { .. }));
    }
}
