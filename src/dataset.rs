use crate::error::StructuralError;
use crate::textutil::actual_column_name;

static EMPTY_CELL: Cell = Cell::Empty;

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Text cell, or `Empty` for an empty string.
    pub fn from_text(s: String) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }

    /// Empty cells and whitespace-only text are blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) | Cell::Bool(_) => false,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Bool(true) => "TRUE".to_string(),
            Cell::Bool(false) => "FALSE".to_string(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One table: ordered named columns and position-addressed rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len().max(row.len()), Cell::Empty);
        self.rows.push(row);
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column matching `logical` case-insensitively.
    #[must_use]
    pub fn find_column(&self, logical: &str) -> Option<usize> {
        let actual = actual_column_name(&self.columns, logical)?;
        self.columns.iter().position(|c| c == actual)
    }

    /// Index of the column named exactly `name`, appending it when missing.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.columns.iter().position(|c| c == name) {
            return idx;
        }
        self.columns.push(name.to_string());
        self.columns.len() - 1
    }

    #[must_use]
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Stringified, trimmed cell text; empty when `col` is `None`.
    #[must_use]
    pub fn text_at(&self, row: usize, col: Option<usize>) -> String {
        match col {
            Some(c) => self.cell(row, c).as_text().trim().to_string(),
            None => String::new(),
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: Cell) -> Result<(), StructuralError> {
        let rows = self.rows.len();
        let Some(r) = self.rows.get_mut(row) else {
            return Err(StructuralError::RowOutOfRange {
                sheet: self.name.clone(),
                row,
                rows,
            });
        };
        if r.len() <= col {
            r.resize(col + 1, Cell::Empty);
        }
        r[col] = value;
        Ok(())
    }

    /// Replaces one column's values by row position; nothing is written unless every
    /// position is in range.
    pub fn write_column(
        &mut self,
        column: &str,
        positions: &[usize],
        values: &[String],
    ) -> Result<(), StructuralError> {
        let col = self.columns.iter().position(|c| c == column).ok_or_else(|| {
            StructuralError::UnknownColumn {
                sheet: self.name.clone(),
                column: column.to_string(),
            }
        })?;
        if let Some(&row) = positions.iter().find(|&&p| p >= self.rows.len()) {
            return Err(StructuralError::RowOutOfRange {
                sheet: self.name.clone(),
                row,
                rows: self.rows.len(),
            });
        }
        for (&row, value) in positions.iter().zip(values) {
            self.set(row, col, Cell::Text(value.clone()))?;
        }
        Ok(())
    }
}

/// An ordered collection of named sheets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    pub sheets: Vec<Sheet>,
}

impl Dataset {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn sheet_mut(&mut self, name: &str) -> Result<&mut Sheet, StructuralError> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| StructuralError::UnknownSheet(name.to_string()))
    }
}
