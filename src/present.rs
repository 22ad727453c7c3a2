//! Display formatting for records, column analyses and sales totals.

use std::{fmt::Write as _, str::FromStr};

use chrono::NaiveDate;
use itertools::Itertools;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::{
    record::PurchaseRecord,
    stats::{Analysis, ColumnInfo},
    table::Align,
};

pub const RECORD_HEADERS: [&str; 6] = [
    "Product Name",
    "Unit Price",
    "Qty Sold",
    "Sale Date",
    "Customer Name",
    "Total Amount",
];

pub const RECORD_ALIGNMENT: [Align; 6] = [
    Align::Left,
    Align::Right,
    Align::Right,
    Align::Left,
    Align::Left,
    Align::Right,
];

pub const COLUMN_HEADERS: [&str; 6] = ["#", "Column", "Type", "Non-empty", "Sum", "Average"];

/// Samples quoted per column in the text report.
const REPORT_SAMPLES: usize = 3;

/// `$` and two fractional digits, midpoints rounded away from zero.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

pub fn format_currency_f64(amount: f64) -> String {
    match Decimal::from_str(&amount.to_string()) {
        Ok(decimal) => format_currency(decimal),
        Err(_) => format!("${amount:.2}"),
    }
}

/// `MM/DD/YYYY`, or empty when there is no date.
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|date| date.format("%m/%d/%Y").to_string())
        .unwrap_or_default()
}

pub fn record_row(record: &PurchaseRecord) -> Vec<String> {
    vec![
        record.item_name.clone(),
        format_currency(record.price),
        record.quantity.to_string(),
        format_date(record.purchase_date),
        record.vendor.clone(),
        format_currency(record.total_cost),
    ]
}

pub fn record_rows(records: &[PurchaseRecord]) -> Vec<Vec<String>> {
    records.iter().map(record_row).collect()
}

fn column_type(column: &ColumnInfo) -> &'static str {
    if column.is_numeric { "Numeric" } else { "Text" }
}

fn non_empty(column: &ColumnInfo) -> String {
    format!(
        "{}/{}",
        column.total_cells - column.empty_cells,
        column.total_cells
    )
}

pub fn column_rows(analysis: &Analysis) -> Vec<Vec<String>> {
    analysis
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.name.clone(),
                column_type(column).to_string(),
                non_empty(column),
                column.sum.map(format_currency_f64).unwrap_or_default(),
                column.average.map(format_currency_f64).unwrap_or_default(),
            ]
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub records: usize,
    pub total_revenue: Decimal,
    pub total_units: u64,
    pub unique_products: usize,
    pub unique_customers: usize,
    /// Present only when at least one unit was sold.
    pub average_revenue_per_unit: Option<Decimal>,
}

impl SalesSummary {
    pub fn from_records(records: &[PurchaseRecord]) -> Self {
        let total_revenue = records.iter().map(|record| record.total_cost).sum::<Decimal>();
        let total_units = records
            .iter()
            .map(|record| u64::from(record.quantity))
            .sum::<u64>();
        let average_revenue_per_unit = (total_units > 0).then(|| {
            (total_revenue / Decimal::from(total_units))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        });
        Self {
            records: records.len(),
            total_revenue,
            total_units,
            unique_products: distinct_non_blank(records.iter().map(|r| r.item_name.as_str())),
            unique_customers: distinct_non_blank(records.iter().map(|r| r.vendor.as_str())),
            average_revenue_per_unit,
        }
    }
}

fn distinct_non_blank<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.filter(|value| !value.trim().is_empty()).unique().count()
}

/// Plain-text report: overview, one block per column, then sales totals
/// when any record was loaded.
pub fn analysis_report(analysis: &Analysis, records: &[PurchaseRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SALES DATA ANALYSIS");
    let _ = writeln!(out, "===================");
    let _ = writeln!(out);
    let _ = writeln!(out, "DATA OVERVIEW:");
    let _ = writeln!(out, "--------------");
    let _ = writeln!(out, "Records loaded: {}", records.len());
    let _ = writeln!(out, "Columns found: {}", analysis.columns.len());
    let _ = writeln!(out);
    let _ = writeln!(out, "COLUMN INFORMATION:");
    let _ = writeln!(out, "-------------------");
    for (idx, column) in analysis.columns.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", idx + 1, column.name);
        let _ = writeln!(out, "   Type: {}", column_type(column));
        let _ = writeln!(out, "   Non-empty cells: {}", non_empty(column));
        if !column.samples.is_empty() {
            let quoted = column
                .samples
                .iter()
                .take(REPORT_SAMPLES)
                .map(|sample| format!("\"{sample}\""))
                .join(", ");
            let _ = writeln!(out, "   Sample values: {quoted}");
        }
        if let (Some(sum), Some(average)) = (column.sum, column.average) {
            let _ = writeln!(out, "   Sum: {}", format_currency_f64(sum));
            let _ = writeln!(out, "   Average: {}", format_currency_f64(average));
        }
        let _ = writeln!(out);
    }

    if !records.is_empty() {
        let summary = SalesSummary::from_records(records);
        let _ = writeln!(out, "SALES SUMMARY:");
        let _ = writeln!(out, "--------------");
        let _ = writeln!(out, "Total Revenue: {}", format_currency(summary.total_revenue));
        let _ = writeln!(out, "Total Units Sold: {}", summary.total_units);
        let _ = writeln!(out, "Unique Products: {}", summary.unique_products);
        let _ = writeln!(out, "Unique Customers: {}", summary.unique_customers);
        if let Some(average) = summary.average_revenue_per_unit {
            let _ = writeln!(out, "Average Revenue per Unit: {}", format_currency(average));
        }
    }
    out
}
