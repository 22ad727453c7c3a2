//! Typed reads of single cells.
//!
//! [`CellReader`] turns one cell into a string, a number or a date. Formula
//! cells are evaluated first. Nothing here fails: a cell that cannot produce
//! the requested type yields a sentinel (empty string, `NaN`, `None`).
//!
//! Serial dates denote wall-clock time as typed into the workbook, so the
//! calendar date of a cell does not depend on any time zone.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;

use crate::{
    formula::FormulaEvaluator,
    workbook::{CellValue, DateSystem, Position, Sheet},
};

/// Text shown for a formula that could not be evaluated.
pub const FORMULA_ERROR: &str = "Formula Error";

/// Largest serial a spreadsheet accepts (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

pub struct CellReader<'a> {
    sheet: &'a Sheet,
    evaluator: &'a dyn FormulaEvaluator,
}

impl<'a> CellReader<'a> {
    pub fn new(sheet: &'a Sheet, evaluator: &'a dyn FormulaEvaluator) -> Self {
        Self { sheet, evaluator }
    }

    pub fn sheet(&self) -> &'a Sheet {
        self.sheet
    }

    pub fn read_string(&self, at: Position) -> String {
        let Some(cell) = self.sheet.cell(at) else {
            return String::new();
        };
        if !cell.is_formula() {
            return self.render(&cell.value);
        }
        match self.evaluator.evaluate(self.sheet, at, cell) {
            Ok(value) => self.render(&value),
            Err(err) => {
                debug!("{at}: formula evaluation failed: {err}");
                FORMULA_ERROR.to_string()
            }
        }
    }

    /// `NaN` when the cell holds no usable number.
    pub fn read_number(&self, at: Position) -> f64 {
        let Some(cell) = self.sheet.cell(at) else {
            return f64::NAN;
        };
        if cell.is_formula() {
            return match self.evaluator.evaluate(self.sheet, at, cell) {
                Ok(value) => value.as_number().unwrap_or(f64::NAN),
                Err(err) => {
                    debug!("{at}: formula evaluation failed, trying cached value: {err}");
                    cell.value.as_number().unwrap_or(f64::NAN)
                }
            };
        }
        match &cell.value {
            CellValue::Number(n) | CellValue::Date(n) => *n,
            CellValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    pub fn read_date(&self, at: Position) -> Option<NaiveDate> {
        let cell = self.sheet.cell(at)?;
        let serial = if cell.is_formula() {
            if !cell.is_date_formatted() {
                return None;
            }
            match self.evaluator.evaluate(self.sheet, at, cell) {
                Ok(value) => value.as_number()?,
                Err(err) => {
                    debug!("{at}: formula evaluation failed, using cached date: {err}");
                    cell.value.as_number()?
                }
            }
        } else {
            cell.value.as_number()?
        };
        serial_to_datetime(serial, self.sheet.date_system()).map(|instant| instant.date())
    }

    fn render(&self, value: &CellValue) -> String {
        match value {
            CellValue::Text(text) => text.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Date(serial) => serial_to_datetime(*serial, self.sheet.date_system())
                .map(format_instant)
                .unwrap_or_else(|| format_number(*serial)),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Blank | CellValue::Error(_) => String::new(),
        }
    }
}

/// Whole numbers render without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value == value.floor() {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn format_instant(instant: NaiveDateTime) -> String {
    if instant.time() == NaiveTime::MIN {
        instant.format("%Y-%m-%d").to_string()
    } else {
        instant.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Converts a serial date to the wall-clock time it denotes. The 1900 system
/// counts a phantom 1900-02-29, so serials before 61 are shifted by one day.
pub fn serial_to_datetime(serial: f64, system: DateSystem) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..=MAX_SERIAL).contains(&serial) {
        return None;
    }
    let (epoch, adjusted) = match system {
        DateSystem::Excel1900 if serial < 61.0 => {
            (NaiveDate::from_ymd_opt(1899, 12, 30)?, serial + 1.0)
        }
        DateSystem::Excel1900 => (NaiveDate::from_ymd_opt(1899, 12, 30)?, serial),
        DateSystem::Excel1904 => (NaiveDate::from_ymd_opt(1904, 1, 1)?, serial),
    };
    let days = adjusted.trunc();
    let seconds = ((adjusted - days) * 86_400.0).round() as i64;
    epoch
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::days(days as i64))?
        .checked_add_signed(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        formula::{CachedResults, Recalculator},
        workbook::Cell,
    };

    fn sheet() -> Sheet {
        Sheet::from_rows(
            "Sales",
            vec![vec![
                Cell::text("  Widget  "),
                Cell::number(3.0),
                Cell::number(9.5),
                Cell::date(45306.0),
                Cell::boolean(true),
                Cell::text(" 12.5 "),
                Cell::text("n/a"),
                Cell::formula("B1*C1", CellValue::Number(0.0)),
                Cell::formula("NOPE(", CellValue::Number(4.0)),
                Cell::date(45306.5),
                Cell::formula("D1+1", CellValue::Date(45307.0)),
                Cell::error("#REF!"),
            ]],
        )
    }

    fn at(col: usize) -> Position {
        Position::new(0, col)
    }

    #[test]
    fn read_string_follows_cell_kind() {
        let sheet = sheet();
        let recalculator = Recalculator::default();
        let reader = CellReader::new(&sheet, &recalculator);
        assert_eq!(reader.read_string(at(0)), "Widget");
        assert_eq!(reader.read_string(at(1)), "3");
        assert_eq!(reader.read_string(at(2)), "9.5");
        assert_eq!(reader.read_string(at(3)), "2024-01-15");
        assert_eq!(reader.read_string(at(4)), "true");
        assert_eq!(reader.read_string(at(7)), "28.5");
        assert_eq!(reader.read_string(at(9)), "2024-01-15T12:00:00");
        assert_eq!(reader.read_string(at(10)), "2024-01-16");
        assert_eq!(reader.read_string(at(11)), "");
        assert_eq!(reader.read_string(at(40)), "");
    }

    #[test]
    fn failed_formulas_read_as_formula_error_text() {
        let sheet = Sheet::from_rows(
            "S",
            vec![vec![Cell::formula("1/0", CellValue::Number(3.0))]],
        );
        let recalculator = Recalculator::default();
        let reader = CellReader::new(&sheet, &recalculator);
        assert_eq!(reader.read_string(at(0)), FORMULA_ERROR);
    }

    #[test]
    fn read_number_parses_text_and_falls_back_to_cache() {
        let sheet = sheet();
        let recalculator = Recalculator::default();
        let reader = CellReader::new(&sheet, &recalculator);
        assert_eq!(reader.read_number(at(1)), 3.0);
        assert_eq!(reader.read_number(at(3)), 45306.0);
        assert_eq!(reader.read_number(at(5)), 12.5);
        assert!(reader.read_number(at(6)).is_nan());
        assert!(reader.read_number(at(4)).is_nan());
        assert_eq!(reader.read_number(at(7)), 28.5);
        // unknown function, cached result
        assert_eq!(reader.read_number(at(8)), 4.0);
        assert!(reader.read_number(at(11)).is_nan());
    }

    #[test]
    fn cached_mode_reports_saved_results() {
        let sheet = sheet();
        let reader = CellReader::new(&sheet, &CachedResults);
        assert_eq!(reader.read_number(at(7)), 0.0);
        assert_eq!(reader.read_string(at(7)), "0");
    }

    #[test]
    fn read_date_accepts_date_cells_serials_and_date_formulas() {
        let sheet = sheet();
        let recalculator = Recalculator::default();
        let reader = CellReader::new(&sheet, &recalculator);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(reader.read_date(at(3)), expected);
        assert_eq!(reader.read_date(at(9)), expected);
        assert_eq!(
            reader.read_date(at(10)),
            NaiveDate::from_ymd_opt(2024, 1, 16)
        );
        // plain numbers are read as serial dates
        assert_eq!(
            reader.read_date(at(1)),
            NaiveDate::from_ymd_opt(1900, 1, 3)
        );
        assert_eq!(reader.read_date(at(0)), None);
        assert_eq!(reader.read_date(at(7)), None);
    }

    #[test]
    fn times_of_day_stay_on_their_calendar_date() {
        let sheet = Sheet::from_rows(
            "Sales",
            vec![vec![Cell::date(45306.01), Cell::date(45306.99)]],
        );
        let reader = CellReader::new(&sheet, &CachedResults);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(reader.read_date(at(0)), expected);
        assert_eq!(reader.read_date(at(1)), expected);
    }

    #[test]
    fn serial_conversion_handles_both_epochs() {
        let date = |serial, system| serial_to_datetime(serial, system).map(|dt| dt.date());
        assert_eq!(
            date(1.0, DateSystem::Excel1900),
            NaiveDate::from_ymd_opt(1900, 1, 1)
        );
        assert_eq!(
            date(61.0, DateSystem::Excel1900),
            NaiveDate::from_ymd_opt(1900, 3, 1)
        );
        assert_eq!(
            date(45292.0, DateSystem::Excel1900),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(
            date(0.0, DateSystem::Excel1904),
            NaiveDate::from_ymd_opt(1904, 1, 1)
        );
        assert_eq!(date(-1.0, DateSystem::Excel1900), None);
        assert_eq!(date(1e12, DateSystem::Excel1900), None);
    }

    #[test]
    fn sheets_on_the_1904_system_shift_their_dates() {
        let sheet = Sheet::from_rows("Mac", vec![vec![Cell::date(43844.0)]])
            .with_date_system(DateSystem::Excel1904);
        let recalculator = Recalculator::default();
        let reader = CellReader::new(&sheet, &recalculator);
        assert_eq!(reader.read_date(at(0)), NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(reader.read_string(at(0)), "2024-01-15");
    }

    #[test]
    fn format_number_drops_integral_fraction() {
        assert_eq!(format_number(28.0), "28");
        assert_eq!(format_number(28.5), "28.5");
        assert_eq!(format_number(-3.0), "-3");
    }
}
