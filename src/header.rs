//! Header row lookup.
//!
//! Sales sheets name the same column many ways ("Qty Sold", "quantity",
//! "qty"). [`HeaderMap`] indexes the header row by normalized text and
//! [`Field`] lists, in precedence order, the names each record field answers
//! to.

use std::collections::HashMap;

use crate::workbook::{Cell, CellValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ItemName,
    Price,
    Quantity,
    PurchaseDate,
    Category,
    Vendor,
    TotalCost,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::ItemName,
        Field::Price,
        Field::Quantity,
        Field::PurchaseDate,
        Field::Category,
        Field::Vendor,
        Field::TotalCost,
    ];

    /// Header names in precedence order. "procuct name" matches a typo found
    /// in real exports and wins over the correct spelling.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::ItemName => &["procuct name", "product name", "item", "itemname", "name"],
            Field::Price => &["unit price", "price", "cost", "unitprice"],
            Field::Quantity => &["qty sold", "quantity sold", "quantity", "qty", "amount"],
            Field::PurchaseDate => &["sale date", "date", "purchasedate", "orderdate"],
            Field::Category => &["category", "type", "group", "sku"],
            Field::Vendor => &["customer name", "vendor", "supplier", "store", "customer"],
            Field::TotalCost => &["total amount", "total", "totalcost", "totalprice"],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    columns: HashMap<String, usize>,
}

impl HeaderMap {
    /// Indexes literal text cells; a repeated name keeps its last column.
    pub fn build(header: &[Cell]) -> Self {
        let columns = header
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_literal_text())
            .filter_map(|(idx, cell)| match &cell.value {
                CellValue::Text(text) => Some((normalize(text), idx)),
                _ => None,
            })
            .collect();
        Self { columns }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.columns.get(&normalize(name)).copied()
    }

    /// Column of the first alias present in the header.
    pub fn resolve(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| self.get(alias))
    }

    /// Every column the field's aliases reach, in alias order and without
    /// repeats.
    pub fn columns_for(&self, field: Field) -> Vec<usize> {
        let mut columns = Vec::new();
        for idx in field.aliases().iter().filter_map(|alias| self.get(alias)) {
            if !columns.contains(&idx) {
                columns.push(idx);
            }
        }
        columns
    }

    /// Name and column pairs ordered by column, for logging.
    pub fn entries(&self) -> Vec<(&str, usize)> {
        let mut entries = self
            .columns
            .iter()
            .map(|(name, idx)| (name.as_str(), *idx))
            .collect::<Vec<_>>();
        entries.sort_by_key(|(_, idx)| *idx);
        entries
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
