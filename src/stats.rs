//! Per-column profiling over the data window.
//!
//! Every column with a header gets a [`ColumnInfo`]: how many cells were
//! inspected, how many were empty, the first few values as text, and for
//! columns holding numbers their sum and average.

use log::debug;
use serde::Serialize;

use crate::{
    cell::{CellReader, format_number},
    rows::DataWindow,
    workbook::{CellValue, Position},
};

/// Numbers above this in a column named like a date are serial dates, not
/// quantities, and stay out of the sums.
const SERIAL_DATE_FLOOR: f64 = 40_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub is_numeric: bool,
    pub sum: Option<f64>,
    pub average: Option<f64>,
    pub samples: Vec<String>,
    pub total_cells: usize,
    pub empty_cells: usize,
    pub numeric_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub columns: Vec<ColumnInfo>,
    pub window: DataWindow,
}

struct ColumnAccumulator {
    index: usize,
    name: String,
    skips_serial_dates: bool,
    max_samples: usize,
    samples: Vec<String>,
    sum: f64,
    count: usize,
    total_cells: usize,
    empty_cells: usize,
}

impl ColumnAccumulator {
    fn new(index: usize, name: String, max_samples: usize) -> Self {
        Self {
            index,
            skips_serial_dates: name.to_lowercase().contains("date"),
            name,
            max_samples,
            samples: Vec::new(),
            sum: 0.0,
            count: 0,
            total_cells: 0,
            empty_cells: 0,
        }
    }

    fn inspect(&mut self, reader: &CellReader<'_>, row: usize) {
        self.total_cells += 1;
        let at = Position::new(row, self.index);
        if reader.sheet().cell(at).is_none_or(|cell| cell.is_blank()) {
            self.empty_cells += 1;
            return;
        }
        let text = reader.read_string(at);
        if text.is_empty() {
            return;
        }
        if self.samples.len() < self.max_samples {
            self.samples.push(text);
        }
        let value = reader.read_number(at);
        if value.is_nan() || (self.skips_serial_dates && value > SERIAL_DATE_FLOOR) {
            return;
        }
        self.sum += value;
        self.count += 1;
    }

    fn finish(self) -> ColumnInfo {
        let is_numeric = self.count > 0;
        let info = ColumnInfo {
            is_numeric,
            sum: is_numeric.then_some(self.sum),
            average: is_numeric.then(|| self.sum / self.count as f64),
            name: self.name,
            samples: self.samples,
            total_cells: self.total_cells,
            empty_cells: self.empty_cells,
            numeric_count: self.count,
        };
        debug!(
            "Column '{}': {}/{} empty, numeric={}, sum={}",
            info.name,
            info.empty_cells,
            info.total_cells,
            info.is_numeric,
            info.sum.map(format_number).unwrap_or_default()
        );
        info
    }
}

pub fn analyze(reader: &CellReader<'_>, window: DataWindow, max_samples: usize) -> Analysis {
    let header = reader.sheet().row(0).unwrap_or_default();
    let mut accumulators = header
        .iter()
        .enumerate()
        .filter(|(_, cell)| !cell.is_blank())
        .map(|(idx, cell)| {
            let name = match &cell.value {
                CellValue::Text(text) if !cell.is_formula() => text.clone(),
                _ => reader.read_string(Position::new(0, idx)),
            };
            ColumnAccumulator::new(idx, name, max_samples)
        })
        .collect::<Vec<_>>();

    for row in window.rows() {
        if reader.sheet().row(row).is_none() {
            continue;
        }
        for accumulator in &mut accumulators {
            accumulator.inspect(reader, row);
        }
    }

    Analysis {
        columns: accumulators
            .into_iter()
            .map(ColumnAccumulator::finish)
            .collect(),
        window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        formula::Recalculator,
        workbook::{Cell, Sheet},
    };
    use proptest::prelude::*;

    fn analyze_sheet(rows: Vec<Vec<Cell>>, window: DataWindow, max_samples: usize) -> Analysis {
        let sheet = Sheet::from_rows("Sales", rows);
        let recalculator = Recalculator::default();
        let reader = CellReader::new(&sheet, &recalculator);
        analyze(&reader, window, max_samples)
    }

    #[test]
    fn numeric_and_text_columns_are_told_apart() {
        let analysis = analyze_sheet(
            vec![
                vec![Cell::text("Product Name"), Cell::text("Total Amount")],
                vec![Cell::text("Widget"), Cell::number(28.5)],
                vec![Cell::text("Gadget"), Cell::formula("2*4", CellValue::Blank)],
            ],
            DataWindow { first: 1, last: 2 },
            5,
        );
        let [product, total] = analysis.columns.as_slice() else {
            panic!("expected two columns");
        };
        assert_eq!(product.name, "Product Name");
        assert!(!product.is_numeric);
        assert_eq!(product.sum, None);
        assert_eq!(product.samples, vec!["Widget", "Gadget"]);

        assert!(total.is_numeric);
        assert_eq!(total.sum, Some(36.5));
        assert_eq!(total.average, Some(18.25));
        assert_eq!(total.samples, vec!["28.5", "8"]);
        assert_eq!(total.total_cells, 2);
        assert_eq!(total.empty_cells, 0);
    }

    #[test]
    fn samples_are_capped_in_row_order() {
        let mut rows = vec![vec![Cell::text("Qty")]];
        rows.extend((1..=8).map(|n| vec![Cell::number(n as f64)]));
        let analysis = analyze_sheet(rows, DataWindow { first: 1, last: 8 }, 3);
        let qty = &analysis.columns[0];
        assert_eq!(qty.samples, vec!["1", "2", "3"]);
        assert_eq!(qty.sum, Some(36.0));
        assert_eq!(qty.numeric_count, 8);
    }

    #[test]
    fn serial_dates_stay_out_of_date_column_sums() {
        let analysis = analyze_sheet(
            vec![
                vec![Cell::text("Sale Date"), Cell::text("Notes")],
                vec![Cell::date(45306.0), Cell::text("first")],
                vec![Cell::number(12.0), Cell::blank(), Cell::text("x")],
            ],
            DataWindow { first: 1, last: 2 },
            5,
        );
        let date = &analysis.columns[0];
        assert_eq!(date.samples, vec!["2024-01-15", "12"]);
        assert_eq!(date.sum, Some(12.0));
        let notes = &analysis.columns[1];
        assert_eq!(notes.empty_cells, 1);
        assert_eq!(notes.total_cells, 2);
    }

    #[test]
    fn blank_column_counts_every_present_row_as_empty() {
        // row 4 is formatted but holds no value
        let analysis = analyze_sheet(
            vec![
                vec![Cell::text("Name"), Cell::text("Vendor")],
                vec![Cell::text("Widget")],
                vec![],
                vec![Cell::blank(), Cell::blank()],
                vec![Cell::text("Gadget")],
            ],
            DataWindow { first: 1, last: 4 },
            5,
        );
        let vendor = &analysis.columns[1];
        assert_eq!(vendor.total_cells, 2);
        assert_eq!(vendor.empty_cells, 2);
        assert!(!vendor.is_numeric);
        assert!(vendor.samples.is_empty());
    }

    #[test]
    fn empty_window_reports_headers_only() {
        let analysis = analyze_sheet(
            vec![vec![Cell::text("Name"), Cell::blank(), Cell::number(2024.0)]],
            DataWindow { first: 1, last: 0 },
            5,
        );
        let names = analysis
            .columns
            .iter()
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Name", "2024"]);
        assert!(analysis.columns.iter().all(|column| column.total_cells == 0));
    }

    fn any_cell() -> impl Strategy<Value = Cell> {
        prop_oneof![
            Just(Cell::blank()),
            (-1.0e6..1.0e6f64).prop_map(Cell::number),
            "[a-z ]{0,6}".prop_map(Cell::text),
            (40_000.0..50_000.0f64).prop_map(Cell::date),
        ]
    }

    proptest! {
        #[test]
        fn counts_stay_within_the_inspected_rows(
            body in prop::collection::vec(prop::collection::vec(any_cell(), 0..5), 0..12),
            max_samples in 1usize..4,
        ) {
            let window = DataWindow { first: 1, last: body.len() };
            let mut rows = vec![vec![
                Cell::text("Name"),
                Cell::text("Qty"),
                Cell::text("Sale Date"),
                Cell::text("Vendor"),
            ]];
            rows.extend(body);
            let sheet = Sheet::from_rows("Sales", rows);
            let present = window.rows().filter(|row| sheet.row(*row).is_some()).count();
            let recalculator = Recalculator::default();
            let reader = CellReader::new(&sheet, &recalculator);
            let analysis = analyze(&reader, window, max_samples);

            prop_assert_eq!(analysis.columns.len(), 4);
            for column in &analysis.columns {
                prop_assert_eq!(column.total_cells, present);
                prop_assert!(column.empty_cells <= column.total_cells);
                prop_assert!(column.numeric_count <= column.total_cells - column.empty_cells);
                prop_assert!(column.samples.len() <= max_samples);
                prop_assert_eq!(column.is_numeric, column.sum.is_some());
            }
        }
    }
}
