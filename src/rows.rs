//! Row classification and data window detection.
//!
//! Row 0 is the header. [`classify()`] returns the inclusive [`DataWindow`]
//! of rows holding records, leaving out trailing summary rows such as a
//! lone column total beneath the last sale.

use log::debug;
use serde::Serialize;

use crate::{
    cell::CellReader,
    options::SummaryDetection,
    workbook::{CellValue, Position},
};

/// Cells after the first one that may carry the descriptive text of a record.
const TEXT_LOOKAHEAD: usize = 7;
/// Cells inspected by the trailing-totals heuristic.
const TOTALS_SPAN: usize = 10;
const TOTALS_MIN_BLANK_RATIO: f64 = 0.6;
const TOTALS_RANGE: std::ops::RangeInclusive<f64> = 1000.0..=100_000.0;
const TOTALS_MAX_ROWS: usize = 2;

/// Inclusive range of data rows; empty when `first > last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataWindow {
    pub first: usize,
    pub last: usize,
}

impl DataWindow {
    pub fn is_empty(&self) -> bool {
        self.first > self.last
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.last - self.first + 1
        }
    }

    pub fn rows(&self) -> std::ops::RangeInclusive<usize> {
        self.first..=self.last
    }
}

/// An absent row, or one whose cells all read as blank text.
pub fn is_row_empty(reader: &CellReader<'_>, row: usize) -> bool {
    let Some(cells) = reader.sheet().row(row) else {
        return true;
    };
    cells.iter().enumerate().all(|(col, cell)| {
        cell.is_blank() || reader.read_string(Position::new(row, col)).is_empty()
    })
}

/// A row that opens with a number or date and carries descriptive text
/// within the following cells.
pub fn has_valid_data(reader: &CellReader<'_>, row: usize) -> bool {
    let Some(cells) = reader.sheet().row(row) else {
        return false;
    };
    let Some(first) = cells.first() else {
        return false;
    };
    let leads_with_value = first.is_date_formatted()
        || (!first.is_formula() && matches!(first.value, CellValue::Number(_)));
    leads_with_value && has_descriptive_text(reader, row, 1, TEXT_LOOKAHEAD)
}

/// Looser rule for sheets that do not lead with a date or number column.
fn has_text_data(reader: &CellReader<'_>, row: usize) -> bool {
    has_descriptive_text(reader, row, 0, TEXT_LOOKAHEAD + 1)
}

fn has_descriptive_text(reader: &CellReader<'_>, row: usize, skip: usize, take: usize) -> bool {
    let Some(cells) = reader.sheet().row(row) else {
        return false;
    };
    cells.iter().skip(skip).take(take).any(|cell| {
        cell.is_literal_text()
            && matches!(&cell.value, CellValue::Text(text) if text.trim().chars().count() > 2)
    })
}

pub fn classify(reader: &CellReader<'_>, detection: SummaryDetection) -> DataWindow {
    let Some(last_row) = reader.sheet().last_row() else {
        return DataWindow { first: 1, last: 0 };
    };
    let window = match detection {
        SummaryDetection::ValidData => valid_data_window(reader, last_row),
        SummaryDetection::TrailingTotals => trailing_totals_window(reader, last_row),
    };
    debug!(
        "Data window for sheet '{}': rows {}..={} ({:?})",
        reader.sheet().name(),
        window.first,
        window.last,
        detection
    );
    window
}

fn valid_data_window(reader: &CellReader<'_>, last_row: usize) -> DataWindow {
    let bounds = |qualifies: &dyn Fn(usize) -> bool| {
        let mut rows = (1..=last_row).filter(|&row| !is_row_empty(reader, row) && qualifies(row));
        let first = rows.next()?;
        let last = rows.last().unwrap_or(first);
        Some((first, last))
    };
    let found = bounds(&|row| has_valid_data(reader, row)).or_else(|| {
        debug!("No row leads with a date or number; scanning for descriptive text instead");
        bounds(&|row| has_text_data(reader, row))
    });
    match found {
        Some((first, last)) => DataWindow { first, last },
        None => DataWindow {
            first: 1,
            last: last_row,
        },
    }
}

fn trailing_totals_window(reader: &CellReader<'_>, last_row: usize) -> DataWindow {
    let mut last = last_row;
    for _ in 0..TOTALS_MAX_ROWS {
        if last < 1 || !looks_like_totals(reader, last) {
            break;
        }
        debug!("Row {} looks like a totals row", last + 1);
        last -= 1;
    }
    DataWindow { first: 1, last }
}

fn looks_like_totals(reader: &CellReader<'_>, row: usize) -> bool {
    let Some(cells) = reader.sheet().row(row) else {
        return false;
    };
    let blank = (0..TOTALS_SPAN)
        .filter(|&col| cells.get(col).is_none_or(|cell| cell.is_blank()))
        .count();
    let carries_total = (0..TOTALS_SPAN.min(cells.len())).any(|col| {
        let value = reader.read_number(Position::new(row, col));
        TOTALS_RANGE.contains(&value)
    });
    blank as f64 / TOTALS_SPAN as f64 >= TOTALS_MIN_BLANK_RATIO && carries_total
}
