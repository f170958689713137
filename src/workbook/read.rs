use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{anyhow, Context};
use quick_xml::events::Event;
use quick_xml::Reader;

use super::package::XlsxPackage;
use super::xml::{attr_value, column_index, local_name, row_index, row_number, MAX_COLUMNS};
use crate::dataset::{Cell, Dataset, Sheet};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

pub fn read_workbook(path: &Path) -> anyhow::Result<Dataset> {
    let pkg = XlsxPackage::read(path)?;
    dataset_from_package(&pkg).with_context(|| format!("read workbook: {}", path.display()))
}

pub fn read_workbook_bytes(bytes: &[u8]) -> anyhow::Result<Dataset> {
    let pkg = XlsxPackage::from_bytes(bytes)?;
    dataset_from_package(&pkg)
}

/// Every worksheet in workbook order; the first row of each sheet holds the column names.
pub fn dataset_from_package(pkg: &XlsxPackage) -> anyhow::Result<Dataset> {
    let workbook = pkg
        .entry(WORKBOOK_PART)
        .ok_or_else(|| anyhow!("not an xlsx workbook: missing {WORKBOOK_PART}"))?;
    let sheets = parse_sheet_list(workbook).context("parse workbook.xml")?;
    let targets = match pkg.entry(WORKBOOK_RELS_PART) {
        Some(rels) => parse_relationships(rels).context("parse workbook rels")?,
        None => HashMap::new(),
    };
    let shared = match pkg.entry(SHARED_STRINGS_PART) {
        Some(sst) => parse_shared_strings(sst).context("parse sharedStrings.xml")?,
        None => Vec::new(),
    };

    let mut out = Vec::with_capacity(sheets.len());
    for (i, (name, rel_id)) in sheets.into_iter().enumerate() {
        let part = targets
            .get(&rel_id)
            .map(|t| resolve_target(t))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", i + 1));
        let data = pkg
            .entry(&part)
            .ok_or_else(|| anyhow!("sheet '{name}': missing part {part}"))?;
        let grid = parse_sheet_cells(data, &shared)
            .with_context(|| format!("parse worksheet '{name}' ({part})"))?;
        out.push(sheet_from_grid(name, grid));
    }
    Ok(Dataset::new(out))
}

fn resolve_target(target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        abs.to_string()
    } else {
        format!("xl/{}", target.trim_start_matches("./"))
    }
}

/// `(name, relationship id)` per `<sheet>`, in order.
fn parse_sheet_list(xml: &[u8]) -> anyhow::Result<Vec<(String, String)>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).context("read xml event")? {
            Event::Eof => break,
            Event::Start(s) | Event::Empty(s) if local_name(s.name().as_ref()) == b"sheet" => {
                let name = attr_value(&s, b"name")?.unwrap_or_default();
                let id = attr_value(&s, b"id")?.unwrap_or_default();
                out.push((name, id));
            }
            _ => {}
        }
    }
    Ok(out)
}

fn parse_relationships(xml: &[u8]) -> anyhow::Result<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = HashMap::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).context("read xml event")? {
            Event::Eof => break,
            Event::Start(s) | Event::Empty(s)
                if local_name(s.name().as_ref()) == b"Relationship" =>
            {
                if let (Some(id), Some(target)) =
                    (attr_value(&s, b"Id")?, attr_value(&s, b"Target")?)
                {
                    out.insert(id, target);
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

/// One string per `<si>`; rich-text runs are concatenated, phonetic runs skipped.
fn parse_shared_strings(xml: &[u8]) -> anyhow::Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut phonetic_depth = 0usize;
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).context("read xml event")? {
            Event::Eof => break,
            Event::Start(s) => match local_name(s.name().as_ref()) {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::Empty(s) if local_name(s.name().as_ref()) == b"si" => out.push(String::new()),
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"si" => out.push(current.take().unwrap_or_default()),
                b"t" => in_t = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                _ => {}
            },
            Event::Text(t) if in_t && phonetic_depth == 0 => {
                if let Some(cur) = current.as_mut() {
                    cur.push_str(&t.unescape().context("unescape text")?);
                }
            }
            Event::CData(t) if in_t && phonetic_depth == 0 => {
                if let Some(cur) = current.as_mut() {
                    cur.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

#[derive(Default)]
struct PendingCell {
    col: usize,
    kind: String,
    value: String,
    has_value: bool,
}

impl PendingCell {
    fn finish(self, shared: &[String]) -> Cell {
        if !self.has_value {
            return Cell::Empty;
        }
        match self.kind.as_str() {
            "s" => {
                let text = self
                    .value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| shared.get(i))
                    .cloned()
                    .unwrap_or_default();
                Cell::from_text(text)
            }
            "inlineStr" | "str" => Cell::from_text(self.value),
            "b" => Cell::Bool(self.value.trim() == "1"),
            // Error values (#N/A, #REF!, ...) carry no data.
            "e" => Cell::Empty,
            _ => match self.value.trim().parse::<f64>() {
                Ok(n) => Cell::Number(n),
                Err(_) => Cell::from_text(self.value),
            },
        }
    }
}

type Grid = BTreeMap<usize, BTreeMap<usize, Cell>>;

fn parse_sheet_cells(xml: &[u8], shared: &[String]) -> anyhow::Result<Grid> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut grid: Grid = BTreeMap::new();

    let mut row_idx: Option<usize> = None;
    let mut next_col = 0usize;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut phonetic_depth = 0usize;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).context("read xml event")? {
            Event::Eof => break,
            Event::Start(s) => match local_name(s.name().as_ref()) {
                b"row" => {
                    row_idx = Some(row_position(&s, row_idx)?);
                    next_col = 0;
                }
                b"rPh" => phonetic_depth += 1,
                b"c" => {
                    let (row, col) = cell_position(&s, row_idx, next_col)?;
                    row_idx = Some(row);
                    next_col = col + 1;
                    cell = Some(PendingCell {
                        col,
                        kind: attr_value(&s, b"t")?.unwrap_or_default(),
                        ..PendingCell::default()
                    });
                }
                b"v" | b"t" if phonetic_depth == 0 => {
                    in_value = true;
                    if let Some(c) = cell.as_mut() {
                        c.has_value = true;
                    }
                }
                _ => {}
            },
            Event::Empty(s) => match local_name(s.name().as_ref()) {
                b"row" => {
                    row_idx = Some(row_position(&s, row_idx)?);
                }
                b"c" => {
                    let (row, col) = cell_position(&s, row_idx, next_col)?;
                    row_idx = Some(row);
                    next_col = col + 1;
                }
                _ => {}
            },
            Event::Text(t) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&t.unescape().context("unescape text")?);
                }
            }
            Event::CData(t) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"v" | b"t" => in_value = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"c" => {
                    phonetic_depth = 0;
                    if let (Some(pending), Some(row)) = (cell.take(), row_idx) {
                        let col = pending.col;
                        let value = pending.finish(shared);
                        if !matches!(value, Cell::Empty) {
                            grid.entry(row).or_default().insert(col, value);
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    Ok(grid)
}

fn row_position(
    s: &quick_xml::events::BytesStart<'_>,
    prev: Option<usize>,
) -> anyhow::Result<usize> {
    match attr_value(s, b"r")? {
        Some(v) => row_number(&v).ok_or_else(|| anyhow!("invalid row number: {v:?}")),
        None => Ok(prev.map_or(0, |p| p + 1)),
    }
}

fn cell_position(
    s: &quick_xml::events::BytesStart<'_>,
    row_idx: Option<usize>,
    next_col: usize,
) -> anyhow::Result<(usize, usize)> {
    let Some(r) = attr_value(s, b"r")? else {
        if next_col >= MAX_COLUMNS {
            return Err(anyhow!("row has more than {MAX_COLUMNS} cells"));
        }
        return Ok((row_idx.unwrap_or(0), next_col));
    };
    let invalid = || anyhow!("invalid cell reference: {r:?}");
    let col = column_index(&r).ok_or_else(invalid)?;
    let has_digits = r.chars().any(|c| c.is_ascii_digit());
    let row = match row_index(&r) {
        Some(row) => row,
        None if has_digits => return Err(invalid()),
        None => row_idx.unwrap_or(0),
    };
    Ok((row, col))
}

/// First populated row becomes the header; blank header cells are named `Unnamed: N`
/// and repeated names get a `.1`, `.2`... suffix.
fn sheet_from_grid(name: String, mut grid: Grid) -> Sheet {
    let Some((&header_row, _)) = grid.iter().next() else {
        return Sheet::new(name, Vec::new());
    };
    let header = grid.remove(&header_row).unwrap_or_default();

    let width = grid
        .values()
        .chain(std::iter::once(&header))
        .filter_map(|r| r.keys().next_back())
        .map(|c| c + 1)
        .max()
        .unwrap_or(0);

    let mut seen: HashSet<String> = HashSet::new();
    let mut columns = Vec::with_capacity(width);
    for idx in 0..width {
        let raw = header.get(&idx).map(Cell::as_text).unwrap_or_default();
        let base = if raw.trim().is_empty() {
            format!("Unnamed: {idx}")
        } else {
            raw
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        columns.push(candidate);
    }

    let mut sheet = Sheet::new(name, columns);
    let Some(&last_row) = grid.keys().next_back() else {
        return sheet;
    };
    for r in (header_row + 1)..=last_row {
        let mut row = vec![Cell::Empty; width];
        if let Some(cells) = grid.remove(&r) {
            for (c, v) in cells {
                row[c] = v;
            }
        }
        sheet.push_row(row);
    }
    sheet
}
