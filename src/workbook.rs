//! Workbook opening and the in-memory sheet model.
//!
//! The container format is decoded by `calamine`; this module copies the
//! first worksheet into a [`Sheet`] of [`Cell`]s addressed by absolute
//! 0-based coordinates so the rest of the crate never touches `calamine`
//! types. Formula text comes from the worksheet's formula range and is kept
//! next to the cached result stored in the file.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use calamine::{Data, ExcelDateTime, ExcelDateTimeType, Range, Reader, Xlsx, open_workbook};
use log::{debug, warn};
use regex::Regex;

use crate::error::IngestError;

/// Absolute 0-based cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Parses `B2`, `$B$2` and friends.
    pub fn parse_a1(reference: &str) -> Option<Self> {
        static A1: OnceLock<Regex> = OnceLock::new();
        let pattern = A1.get_or_init(|| {
            Regex::new(r"^\$?([A-Za-z]{1,3})\$?([1-9][0-9]{0,6})$").expect("valid A1 pattern")
        });
        let captures = pattern.captures(reference)?;
        let col = captures[1]
            .chars()
            .fold(0usize, |acc, ch| {
                acc * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1)
            })
            .checked_sub(1)?;
        let row = captures[2].parse::<usize>().ok()?.checked_sub(1)?;
        Some(Self { row, col })
    }

    pub fn column_letters(&self) -> String {
        let mut letters = Vec::new();
        let mut remaining = self.col + 1;
        while remaining > 0 {
            let rem = (remaining - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            remaining = (remaining - 1) / 26;
        }
        letters.iter().rev().collect()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_letters(), self.row + 1)
    }
}

/// Literal content of a cell, or the cached result of a formula.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Text(String),
    Number(f64),
    /// Serial date of a cell carrying a date number format.
    Date(f64),
    Bool(bool),
    Error(String),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) | CellValue::Date(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Blank,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                CellValue::Text(s.clone())
            }
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::DateTime(dt) if dt.is_duration() => CellValue::Number(dt.as_f64()),
            Data::DateTime(dt) => CellValue::Date(dt.as_f64()),
            Data::Error(err) => CellValue::Error(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub formula: Option<String>,
}

impl Cell {
    pub fn blank() -> Self {
        CellValue::Blank.into()
    }

    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into()).into()
    }

    pub fn number(value: f64) -> Self {
        CellValue::Number(value).into()
    }

    pub fn date(serial: f64) -> Self {
        CellValue::Date(serial).into()
    }

    pub fn boolean(value: bool) -> Self {
        CellValue::Bool(value).into()
    }

    pub fn error(code: impl Into<String>) -> Self {
        CellValue::Error(code.into()).into()
    }

    /// A formula cell; `cached` is the result last saved with the workbook.
    pub fn formula(expression: impl Into<String>, cached: CellValue) -> Self {
        Self {
            value: cached,
            formula: Some(expression.into()),
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    pub fn is_blank(&self) -> bool {
        self.formula.is_none() && self.value.is_blank()
    }

    /// True for literal text (formula results do not count).
    pub fn is_literal_text(&self) -> bool {
        self.formula.is_none() && matches!(self.value, CellValue::Text(_))
    }

    pub fn is_date_formatted(&self) -> bool {
        matches!(self.value, CellValue::Date(_))
    }
}

impl From<CellValue> for Cell {
    fn from(value: CellValue) -> Self {
        Self {
            value,
            formula: None,
        }
    }
}

/// Epoch convention of serial dates in a workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSystem {
    #[default]
    Excel1900,
    Excel1904,
}

/// Random-access view of one worksheet. Rows without any populated cell are
/// absent, and trailing blank cells are dropped from each row.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    name: String,
    rows: Vec<Option<Vec<Cell>>>,
    date_system: DateSystem,
}

impl Sheet {
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut rows = rows.into_iter().map(compact_row).collect::<Vec<_>>();
        while matches!(rows.last(), Some(None)) {
            rows.pop();
        }
        Self {
            name: name.into(),
            rows,
            date_system: DateSystem::default(),
        }
    }

    pub fn with_date_system(mut self, date_system: DateSystem) -> Self {
        self.date_system = date_system;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date_system(&self) -> DateSystem {
        self.date_system
    }

    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).and_then(|row| row.as_deref())
    }

    pub fn cell(&self, position: Position) -> Option<&Cell> {
        self.row(position.row).and_then(|row| row.get(position.col))
    }

    /// Index of the last present row.
    pub fn last_row(&self) -> Option<usize> {
        self.rows.len().checked_sub(1)
    }

    pub fn present_rows(&self) -> usize {
        self.rows.iter().filter(|row| row.is_some()).count()
    }
}

fn compact_row(mut row: Vec<Cell>) -> Option<Vec<Cell>> {
    while row.last().is_some_and(Cell::is_blank) {
        row.pop();
    }
    (!row.is_empty()).then_some(row)
}

/// An opened workbook reduced to its first sheet.
#[derive(Debug)]
pub struct Workbook {
    path: PathBuf,
    sheet: Sheet,
}

impl Workbook {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let mut workbook: Xlsx<_> =
            open_workbook(path).map_err(|err| IngestError::unreadable(path, err))?;
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| IngestError::unreadable(path, "workbook contains no sheets"))?;
        let values = workbook
            .worksheet_range(&sheet_name)
            .map_err(|err| IngestError::unreadable(path, err))?;
        let formulas = match workbook.worksheet_formula(&sheet_name) {
            Ok(range) => Some(range),
            Err(err) => {
                warn!("Ignoring formulas of sheet '{sheet_name}' in {path:?}: {err}");
                None
            }
        };
        let sheet = sheet_from_ranges(&sheet_name, &values, formulas.as_ref());
        debug!(
            "Loaded sheet '{}' from {:?} ({} populated row(s))",
            sheet.name(),
            path,
            sheet.present_rows()
        );
        Ok(Self {
            path: path.to_path_buf(),
            sheet,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }
}

fn sheet_from_ranges(name: &str, values: &Range<Data>, formulas: Option<&Range<String>>) -> Sheet {
    let end = [values.end(), formulas.and_then(|range| range.end())]
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<(u32, u32)>, (row, col)| match acc {
            Some((max_row, max_col)) => Some((max_row.max(row), max_col.max(col))),
            None => Some((row, col)),
        });
    let Some((end_row, end_col)) = end else {
        return Sheet::from_rows(name, Vec::new());
    };

    let rows = (0..=end_row)
        .map(|row| {
            (0..=end_col)
                .map(|col| {
                    let value = values
                        .get_value((row, col))
                        .map(CellValue::from)
                        .unwrap_or(CellValue::Blank);
                    let formula = formulas
                        .and_then(|range| range.get_value((row, col)))
                        .map(|text| text.trim())
                        .filter(|text| !text.is_empty())
                        .map(str::to_string);
                    Cell { value, formula }
                })
                .collect()
        })
        .collect();
    Sheet::from_rows(name, rows).with_date_system(date_system(values))
}

/// calamine keeps the workbook's 1904 flag inside each date value, so the
/// first date cell tells which epoch the sheet counts from.
fn date_system(values: &Range<Data>) -> DateSystem {
    values
        .used_cells()
        .find_map(|(_, _, data)| match data {
            Data::DateTime(dt) if dt.is_datetime() => {
                let from_1900 =
                    ExcelDateTime::new(dt.as_f64(), ExcelDateTimeType::DateTime, false);
                Some(if dt.as_datetime() == from_1900.as_datetime() {
                    DateSystem::Excel1900
                } else {
                    DateSystem::Excel1904
                })
            }
            _ => None,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_a1_handles_absolute_markers_and_multi_letter_columns() {
        assert_eq!(Position::parse_a1("B2"), Some(Position::new(1, 1)));
        assert_eq!(Position::parse_a1("$C$10"), Some(Position::new(9, 2)));
        assert_eq!(Position::parse_a1("aa1"), Some(Position::new(0, 26)));
        assert_eq!(Position::parse_a1("A0"), None);
        assert_eq!(Position::parse_a1("total"), None);
    }

    #[test]
    fn position_displays_in_a1_notation() {
        assert_eq!(Position::new(0, 0).to_string(), "A1");
        assert_eq!(Position::new(4, 27).to_string(), "AB5");
    }

    #[test]
    fn from_rows_drops_blank_rows_and_trailing_blank_cells() {
        let sheet = Sheet::from_rows(
            "Sheet1",
            vec![
                vec![Cell::text("Name"), Cell::text("Price")],
                vec![Cell::blank(), Cell::blank()],
                vec![Cell::text("Widget"), Cell::number(2.0), Cell::blank()],
                vec![],
            ],
        );
        assert_eq!(sheet.last_row(), Some(2));
        assert!(sheet.row(1).is_none());
        assert_eq!(sheet.row(2).map(<[Cell]>::len), Some(2));
        assert_eq!(sheet.present_rows(), 2);
    }

    #[test]
    fn formula_cells_are_never_blank() {
        let cell = Cell::formula("B2*C2", CellValue::Blank);
        assert!(!cell.is_blank());
        assert!(cell.is_formula());
        assert!(!cell.is_literal_text());
    }

    fn dated_range(is_1904: bool) -> Range<Data> {
        let mut range = Range::new((0, 0), (1, 0));
        range.set_value((0, 0), Data::String("Sale Date".into()));
        range.set_value(
            (1, 0),
            Data::DateTime(ExcelDateTime::new(
                43844.0,
                ExcelDateTimeType::DateTime,
                is_1904,
            )),
        );
        range
    }

    #[test]
    fn date_system_follows_the_workbook_flag() {
        assert_eq!(date_system(&dated_range(false)), DateSystem::Excel1900);
        assert_eq!(date_system(&dated_range(true)), DateSystem::Excel1904);

        let sheet = sheet_from_ranges("Mac", &dated_range(true), None);
        assert_eq!(sheet.date_system(), DateSystem::Excel1904);
        assert_eq!(
            sheet.cell(Position::new(1, 0)).map(|cell| &cell.value),
            Some(&CellValue::Date(43844.0))
        );
    }

    #[test]
    fn sheets_without_dates_default_to_1900() {
        let mut range = Range::new((0, 0), (0, 0));
        range.set_value((0, 0), Data::Float(2.0));
        assert_eq!(date_system(&range), DateSystem::Excel1900);
    }

    #[test]
    fn calamine_data_maps_onto_cell_values() {
        assert_eq!(CellValue::from(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(
            CellValue::from(&Data::String("Acme".into())),
            CellValue::Text("Acme".into())
        );
        assert_eq!(CellValue::from(&Data::Empty), CellValue::Blank);
    }
}
