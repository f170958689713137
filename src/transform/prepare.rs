use once_cell::sync::Lazy;
use regex::Regex;

use crate::dataset::{Cell, Sheet};
use crate::textutil::format_price_value;

static SKU_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("sku regex"));

pub const PRICE_COLUMNS: [&str; 5] = ["RRP", "Now", "Saving", "WAS", "UOM"];
pub const TYPE_SOURCE_COLUMN: &str = "EDT/EDP";
pub const TYPE_COLUMN: &str = "Type";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrepareOptions {
    pub large_sheet_threshold: usize,
    pub truncation_buffer: usize,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            large_sheet_threshold: 10_000,
            truncation_buffer: 20,
        }
    }
}

/// Cleans one sheet in place before jobs are extracted. Returns user-facing warnings.
///
/// Rows are renumbered densely afterwards; positions taken later refer to this snapshot.
pub fn prepare_sheet(sheet: &mut Sheet, opts: &PrepareOptions) -> Vec<String> {
    let mut warnings = Vec::new();
    if sheet.row_count() > opts.large_sheet_threshold {
        let before = sheet.row_count();
        truncate_large_sheet(sheet, opts.truncation_buffer);
        warnings.push(format!(
            "sheet '{}' is large ({before} rows) and was truncated to {} rows",
            sheet.name,
            sheet.row_count()
        ));
    }
    filter_numeric_skus(sheet);
    standardize_type(sheet);
    format_prices(sheet);
    warnings
}

/// Drops rows with no cells at all, then keeps everything up to the last row holding a
/// non-blank value plus `buffer` rows.
pub fn truncate_large_sheet(sheet: &mut Sheet, buffer: usize) {
    let original = std::mem::take(&mut sheet.rows);
    let kept: Vec<Vec<Cell>> = original
        .iter()
        .filter(|row| row.iter().any(|c| !matches!(c, Cell::Empty)))
        .cloned()
        .collect();
    let last_with_data = kept
        .iter()
        .rposition(|row| row.iter().any(|c| !c.is_blank()));

    sheet.rows = match last_with_data {
        Some(last) => kept.into_iter().take(last + 1 + buffer).collect(),
        None => original.into_iter().take(buffer).collect(),
    };
}

/// Keeps only rows whose `SKU code` is purely digits.
pub fn filter_numeric_skus(sheet: &mut Sheet) {
    let Some(col) = sheet.find_column("SKU code") else {
        return;
    };
    sheet.rows.retain(|row| {
        row.get(col)
            .is_some_and(|c| !matches!(c, Cell::Empty) && SKU_RE.is_match(&c.as_text()))
    });
}

/// Renames `EDT/EDP` to `Type` and normalizes its values.
pub fn standardize_type(sheet: &mut Sheet) {
    let Some(type_col) = sheet.find_column(TYPE_SOURCE_COLUMN) else {
        return;
    };
    sheet.columns[type_col] = TYPE_COLUMN.to_string();
    let size_col = sheet.find_column("Size");

    for row in &mut sheet.rows {
        let Some(cell) = row.get_mut(type_col) else {
            continue;
        };
        let raw = cell.as_text().trim().to_uppercase();
        let is_each = raw == "EACH";
        *cell = Cell::from_text(normalize_type(&raw));

        if is_each {
            if let Some(size) = size_col.and_then(|c| row.get_mut(c)) {
                let s = size.as_text();
                let s = s.trim();
                if s == "1" || s == "1.0" {
                    *size = Cell::Empty;
                }
            }
        }
    }
}

/// Maps an already trimmed, uppercased type value.
#[must_use]
pub fn normalize_type(upper: &str) -> String {
    match upper {
        "MIST" | "BODYMIST" | "BODY MIST" => "Body Mist".to_string(),
        "EACH" => String::new(),
        other => other.to_string(),
    }
}

pub fn format_prices(sheet: &mut Sheet) {
    for name in PRICE_COLUMNS {
        let Some(col) = sheet.find_column(name) else {
            continue;
        };
        for row in &mut sheet.rows {
            if let Some(cell) = row.get_mut(col) {
                *cell = Cell::from_text(format_price_value(&cell.as_text()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|s| Cell::from_text((*s).to_string()))
            .collect()
    }

    #[test]
    fn sku_filter_keeps_digit_only_rows() {
        let mut s = Sheet::new("S", vec!["SKU Code ".into(), "Brand".into()]);
        s.push_row(row(&["12345", "Dior"]));
        s.push_row(row(&["AB12", "Chanel"]));
        s.push_row(row(&["", "Gucci"]));
        s.push_row(vec![Cell::Number(777.0), Cell::text("Prada")]);
        filter_numeric_skus(&mut s);
        assert_eq!(s.row_count(), 2);
        assert_eq!(s.text_at(0, Some(1)), "Dior");
        assert_eq!(s.text_at(1, Some(1)), "Prada");
    }

    #[test]
    fn type_column_is_renamed_and_normalized() {
        let mut s = Sheet::new("S", vec!["edt/edp".into(), "Size".into()]);
        s.push_row(row(&[" edt ", "50ml"]));
        s.push_row(row(&["body mist", "200"]));
        s.push_row(row(&["Each", "1"]));
        s.push_row(vec![Cell::text("EACH"), Cell::Number(1.0)]);
        s.push_row(row(&["EACH", "2"]));
        standardize_type(&mut s);

        assert_eq!(s.columns[0], "Type");
        let types: Vec<String> = (0..5).map(|r| s.text_at(r, Some(0))).collect();
        assert_eq!(types, ["EDT", "Body Mist", "", "", ""]);
        let sizes: Vec<String> = (0..5).map(|r| s.text_at(r, Some(1))).collect();
        assert_eq!(sizes, ["50ml", "200", "", "", "2"]);
    }

    #[test]
    fn price_columns_are_formatted() {
        let mut s = Sheet::new("S", vec!["RRP".into(), "now".into(), "Other".into()]);
        s.push_row(vec![Cell::text("£1,299.00"), Cell::Number(12.5), Cell::text("£3")]);
        s.push_row(row(&["N/A", "abc", "x"]));
        format_prices(&mut s);
        assert_eq!(s.text_at(0, Some(0)), "1299");
        assert_eq!(s.text_at(0, Some(1)), "12.50");
        assert_eq!(s.text_at(0, Some(2)), "£3");
        assert_eq!(s.cell(1, 0), &Cell::Empty);
        assert_eq!(s.cell(1, 1), &Cell::Empty);
    }

    #[test]
    fn large_sheet_keeps_data_plus_buffer() {
        let mut s = Sheet::new("Big", vec!["Brand".into()]);
        for i in 0..10 {
            s.push_row(row(&[&format!("b{i}")]));
        }
        s.push_row(vec![Cell::Empty]);
        for _ in 0..30 {
            s.push_row(row(&["  "]));
        }
        let opts = PrepareOptions {
            large_sheet_threshold: 20,
            truncation_buffer: 5,
        };
        let warnings = prepare_sheet(&mut s, &opts);
        assert_eq!(s.row_count(), 15);
        assert_eq!(s.text_at(9, Some(0)), "b9");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn large_sheet_without_data_keeps_first_rows() {
        let mut s = Sheet::new("Blank", vec!["Brand".into()]);
        for _ in 0..50 {
            s.push_row(vec![Cell::Empty]);
        }
        truncate_large_sheet(&mut s, 20);
        assert_eq!(s.row_count(), 20);
    }

    #[test]
    fn small_sheets_are_not_truncated() {
        let mut s = Sheet::new("Small", vec!["Brand".into()]);
        s.push_row(vec![Cell::Empty]);
        s.push_row(row(&["Dior"]));
        assert!(prepare_sheet(&mut s, &PrepareOptions::default()).is_empty());
        assert_eq!(s.row_count(), 2);
    }
}
