//! Purchase records and their extraction from data rows.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    cell::CellReader,
    header::{Field, HeaderMap},
    workbook::Position,
};

/// One sale as it appears in the sheet. Fields missing from the header read
/// as empty text, zero or `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseRecord {
    pub item_name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub purchase_date: Option<NaiveDate>,
    /// May hold a SKU when the sheet has no category column.
    pub category: String,
    pub vendor: String,
    pub total_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Record(PurchaseRecord),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingItemName,
    Malformed(String),
}

pub fn extract(reader: &CellReader<'_>, row: usize, header: &HeaderMap) -> RowOutcome {
    match try_extract(reader, row, header) {
        Ok(record) if record.item_name.is_empty() => RowOutcome::Skip(SkipReason::MissingItemName),
        Ok(record) => RowOutcome::Record(record),
        Err(reason) => RowOutcome::Skip(SkipReason::Malformed(reason)),
    }
}

fn try_extract(
    reader: &CellReader<'_>,
    row: usize,
    header: &HeaderMap,
) -> Result<PurchaseRecord, String> {
    let fields = FieldReader {
        reader,
        row,
        header,
    };
    Ok(PurchaseRecord {
        item_name: fields.text(Field::ItemName),
        price: fields.decimal(Field::Price)?,
        quantity: fields.quantity()?,
        purchase_date: fields.date(Field::PurchaseDate),
        category: fields.text(Field::Category),
        vendor: fields.text(Field::Vendor),
        total_cost: fields.decimal(Field::TotalCost)?,
    })
}

struct FieldReader<'r, 'a> {
    reader: &'r CellReader<'a>,
    row: usize,
    header: &'r HeaderMap,
}

impl FieldReader<'_, '_> {
    fn positions(&self, field: Field) -> impl Iterator<Item = Position> + '_ {
        self.header
            .columns_for(field)
            .into_iter()
            .map(move |col| Position::new(self.row, col))
    }

    fn text(&self, field: Field) -> String {
        self.positions(field)
            .map(|at| self.reader.read_string(at))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }

    fn number(&self, field: Field) -> Option<f64> {
        self.positions(field)
            .map(|at| self.reader.read_number(at))
            .find(|value| !value.is_nan())
    }

    fn date(&self, field: Field) -> Option<NaiveDate> {
        self.positions(field)
            .find_map(|at| self.reader.read_date(at))
    }

    fn decimal(&self, field: Field) -> Result<Decimal, String> {
        let Some(value) = self.number(field) else {
            return Ok(Decimal::ZERO);
        };
        Decimal::from_str(&value.to_string())
            .map_err(|err| format!("{field:?} value {value} is not representable: {err}"))
    }

    /// Fractions are truncated and negatives clamp to zero.
    fn quantity(&self) -> Result<u32, String> {
        let Some(value) = self.number(Field::Quantity) else {
            return Ok(0);
        };
        let truncated = value.trunc().max(0.0);
        if truncated > f64::from(u32::MAX) {
            return Err(format!("Quantity {value} exceeds {}", u32::MAX));
        }
        Ok(truncated as u32)
    }
}
