use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;

use super::package::XlsxPackage;
use super::xml::{column_letters, escape_attr, escape_text};
use crate::dataset::{Cell, Dataset, Sheet};
use crate::textutil::truncate_chars;

const SHEET_NAME_LIMIT: usize = 31;
const PART_PREFIX_LIMIT: usize = 25;
const MAX_COLUMN_WIDTH: usize = 255;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub max_rows_per_sheet: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_rows_per_sheet: 500_000,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub written: Vec<String>,
    pub skipped_empty: Vec<String>,
    pub warnings: Vec<String>,
}

/// One worksheet to emit: a row range of a source sheet under its final name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportPart {
    pub name: String,
    pub sheet: usize,
    pub start: usize,
    pub end: usize,
}

/// Decides which sheets are written, split and renamed.
pub fn plan_export(dataset: &Dataset, opts: &ExportOptions) -> (Vec<ExportPart>, ExportReport) {
    let max_rows = opts.max_rows_per_sheet.max(1);
    let mut report = ExportReport::default();
    let mut parts = Vec::new();
    let mut used: HashSet<String> = HashSet::new();

    for (i, sheet) in dataset.sheets.iter().enumerate() {
        if sheet.is_empty() {
            report.skipped_empty.push(sheet.name.clone());
            continue;
        }
        let rows = sheet.row_count();
        if rows <= max_rows {
            let name = unique_name(&mut used, truncate_chars(&sheet.name, SHEET_NAME_LIMIT));
            parts.push(ExportPart {
                name,
                sheet: i,
                start: 0,
                end: rows,
            });
            continue;
        }
        report.warnings.push(format!(
            "sheet '{}' has {rows} rows, exceeding max per sheet ({max_rows}); it was split",
            sheet.name
        ));
        let prefix = truncate_chars(&sheet.name, PART_PREFIX_LIMIT);
        for (n, start) in (0..rows).step_by(max_rows).enumerate() {
            let name = truncate_chars(&format!("{prefix}_Part{}", n + 1), SHEET_NAME_LIMIT);
            parts.push(ExportPart {
                name: unique_name(&mut used, name),
                sheet: i,
                start,
                end: (start + max_rows).min(rows),
            });
        }
    }
    report.written = parts.iter().map(|p| p.name.clone()).collect();
    (parts, report)
}

fn unique_name(used: &mut HashSet<String>, name: String) -> String {
    let mut candidate = name.clone();
    let mut n = 2;
    while !used.insert(candidate.to_lowercase()) {
        let suffix = format!("({n})");
        let keep = SHEET_NAME_LIMIT.saturating_sub(suffix.chars().count());
        candidate = format!("{}{suffix}", truncate_chars(&name, keep));
        n += 1;
    }
    candidate
}

/// Writes every non-empty sheet; an empty result still produces a valid workbook
/// holding one blank sheet.
pub fn write_workbook(
    dataset: &Dataset,
    output: &Path,
    opts: &ExportOptions,
) -> anyhow::Result<ExportReport> {
    let (mut parts, report) = plan_export(dataset, opts);
    let placeholder = Sheet::new("Sheet1", Vec::new());
    let placeholder_set = Dataset::new(vec![placeholder]);
    let source = if parts.is_empty() {
        parts.push(ExportPart {
            name: "Sheet1".to_string(),
            sheet: 0,
            start: 0,
            end: 0,
        });
        &placeholder_set
    } else {
        dataset
    };

    let mut pkg = XlsxPackage::default();
    pkg.push("[Content_Types].xml", content_types_xml(parts.len()).into_bytes());
    pkg.push("_rels/.rels", ROOT_RELS_XML.as_bytes().to_vec());
    pkg.push("xl/workbook.xml", workbook_xml(&parts).into_bytes());
    pkg.push(
        "xl/_rels/workbook.xml.rels",
        workbook_rels_xml(parts.len()).into_bytes(),
    );
    pkg.push("xl/styles.xml", STYLES_XML.as_bytes().to_vec());

    let mut widths_cache: Vec<Option<Vec<usize>>> = vec![None; source.sheets.len()];
    for (n, part) in parts.iter().enumerate() {
        let sheet = &source.sheets[part.sheet];
        let widths = widths_cache[part.sheet]
            .get_or_insert_with(|| column_widths(sheet))
            .clone();
        let xml = worksheet_xml(sheet, part.start, part.end, &widths);
        pkg.push(format!("xl/worksheets/sheet{}.xml", n + 1), xml.into_bytes());
    }

    pkg.write(output)
        .with_context(|| format!("write workbook: {}", output.display()))?;
    Ok(report)
}

/// `max(header, longest cell text) + 2` characters per column, over the whole sheet.
pub fn column_widths(sheet: &Sheet) -> Vec<usize> {
    let mut widths: Vec<usize> = sheet.columns.iter().map(|c| c.chars().count()).collect();
    for row in &sheet.rows {
        for (i, cell) in row.iter().enumerate() {
            if i >= widths.len() {
                widths.resize(i + 1, 0);
            }
            widths[i] = widths[i].max(cell.as_text().chars().count());
        }
    }
    widths
        .into_iter()
        .map(|w| (w + 2).min(MAX_COLUMN_WIDTH))
        .collect()
}

fn content_types_xml(sheets: usize) -> String {
    let mut out = String::new();
    out.push_str(XML_DECL);
    out.push_str(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    );
    out.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    out.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    out.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
    out.push_str(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
    for n in 1..=sheets {
        let _ = write!(
            out,
            r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        );
    }
    out.push_str("</Types>");
    out
}

const ROOT_RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    "</Relationships>"
);

fn workbook_xml(parts: &[ExportPart]) -> String {
    let mut out = String::new();
    out.push_str(XML_DECL);
    let _ = write!(out, r#"<workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><sheets>"#);
    for (i, p) in parts.iter().enumerate() {
        let n = i + 1;
        let _ = write!(
            out,
            r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#,
            escape_attr(&p.name)
        );
    }
    out.push_str("</sheets></workbook>");
    out
}

fn workbook_rels_xml(sheets: usize) -> String {
    let mut out = String::new();
    out.push_str(XML_DECL);
    out.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for n in 1..=sheets {
        let _ = write!(
            out,
            r#"<Relationship Id="rId{n}" Type="{NS_REL}/worksheet" Target="worksheets/sheet{n}.xml"/>"#
        );
    }
    let _ = write!(
        out,
        r#"<Relationship Id="rId{}" Type="{NS_REL}/styles" Target="styles.xml"/>"#,
        sheets + 1
    );
    out.push_str("</Relationships>");
    out
}

const STYLES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    r#"<fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts>"#,
    r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    r#"<cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs>"#,
    r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
    "</styleSheet>"
);

fn worksheet_xml(sheet: &Sheet, start: usize, end: usize, widths: &[usize]) -> String {
    let mut out = String::new();
    out.push_str(XML_DECL);
    let _ = write!(out, r#"<worksheet xmlns="{NS_MAIN}">"#);
    if !widths.is_empty() {
        out.push_str("<cols>");
        for (i, w) in widths.iter().enumerate() {
            let n = i + 1;
            let _ = write!(out, r#"<col min="{n}" max="{n}" width="{w}" customWidth="1"/>"#);
        }
        out.push_str("</cols>");
    }
    out.push_str("<sheetData>");

    if !sheet.columns.is_empty() {
        out.push_str(r#"<row r="1">"#);
        for (c, name) in sheet.columns.iter().enumerate() {
            push_cell(&mut out, c, 0, &Cell::Text(name.clone()), true);
        }
        out.push_str("</row>");
    }
    for (offset, row) in sheet.rows[start..end].iter().enumerate() {
        let r = offset + 1;
        let _ = write!(out, r#"<row r="{}">"#, r + 1);
        for (c, cell) in row.iter().enumerate() {
            push_cell(&mut out, c, r, cell, false);
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData></worksheet>");
    out
}

fn push_cell(out: &mut String, col: usize, row: usize, cell: &Cell, header: bool) {
    let r = format!("{}{}", column_letters(col), row + 1);
    let style = if header { r#" s="1""# } else { "" };
    match cell {
        Cell::Empty => {}
        Cell::Text(s) if s.is_empty() => {}
        Cell::Text(s) => {
            let space = if s.trim() != s.as_str() {
                r#" xml:space="preserve""#
            } else {
                ""
            };
            let _ = write!(
                out,
                r#"<c r="{r}" t="inlineStr"{style}><is><t{space}>{}</t></is></c>"#,
                escape_text(s)
            );
        }
        Cell::Number(n) if n.is_finite() => {
            let _ = write!(out, r#"<c r="{r}"{style}><v>{n}</v></c>"#);
        }
        Cell::Number(_) => {}
        Cell::Bool(b) => {
            let _ = write!(out, r#"<c r="{r}" t="b"{style}><v>{}</v></c>"#, u8::from(*b));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::read::read_workbook;

    fn sheet(name: &str, rows: usize) -> Sheet {
        let mut s = Sheet::new(name, vec!["Brand".into(), "Now".into()]);
        for i in 0..rows {
            s.push_row(vec![Cell::text(format!("b{i}")), Cell::Number(i as f64)]);
        }
        s
    }

    #[test]
    fn empty_sheets_are_skipped_and_large_ones_split() {
        let ds = Dataset::new(vec![
            sheet("Empty", 0),
            sheet("A very long sheet name that goes on", 5),
            sheet("Small", 2),
        ]);
        let (parts, report) = plan_export(&ds, &ExportOptions { max_rows_per_sheet: 2 });
        let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "A very long sheet name th_Part1",
                "A very long sheet name th_Part2",
                "A very long sheet name th_Part3",
                "Small",
            ]
        );
        assert_eq!((parts[2].start, parts[2].end), (4, 5));
        assert_eq!(report.skipped_empty, ["Empty"]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn widths_cover_header_and_longest_value() {
        let mut s = Sheet::new("S", vec!["Brand".into(), "X".into()]);
        s.push_row(vec![Cell::text("Yves Saint Laurent"), Cell::Number(1.0)]);
        assert_eq!(column_widths(&s), [20, 3]);
    }

    #[test]
    fn workbook_round_trips_through_reader() {
        let mut s = Sheet::new("Offers & More", vec!["Brand".into(), "Now".into(), "Flag".into()]);
        s.push_row(vec![Cell::text("Dolce <&> Gabbana"), Cell::Number(19.99), Cell::Bool(true)]);
        s.push_row(vec![Cell::text(" padded "), Cell::Empty, Cell::Empty]);
        let ds = Dataset::new(vec![s.clone(), sheet("Empty", 0)]);

        let path = std::env::temp_dir().join(format!("fc-write-{}.xlsx", std::process::id()));
        let report = write_workbook(&ds, &path, &ExportOptions::default()).expect("write");
        assert_eq!(report.written, ["Offers & More"]);

        let back = read_workbook(&path).expect("read");
        assert_eq!(back.sheets.len(), 1);
        assert_eq!(back.sheets[0], s);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn duplicate_names_after_truncation_are_made_unique() {
        let mut used = HashSet::new();
        let a = unique_name(&mut used, "Sheet".to_string());
        let b = unique_name(&mut used, "sheet".to_string());
        assert_eq!(a, "Sheet");
        assert_eq!(b, "sheet(2)");
    }
}
