use serde::Serialize;

use crate::dataset::{Dataset, Sheet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Brand,
    Description,
}

impl ColumnKind {
    pub const ALL: [ColumnKind; 2] = [ColumnKind::Brand, ColumnKind::Description];

    /// Logical column name, prompt payload header and expected response header.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            ColumnKind::Brand => "brand",
            ColumnKind::Description => "description",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkSizes {
    pub brand: usize,
    pub description: usize,
}

impl ChunkSizes {
    #[must_use]
    pub fn for_kind(&self, kind: ColumnKind) -> usize {
        let n = match kind {
            ColumnKind::Brand => self.brand,
            ColumnKind::Description => self.description,
        };
        n.max(1)
    }
}

impl Default for ChunkSizes {
    fn default() -> Self {
        Self {
            brand: 70,
            description: 30,
        }
    }
}

/// All non-blank cells of one eligible column, with their row positions.
///
/// `positions` and `values` are index-aligned and `positions` is ascending.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionJob {
    pub sheet: String,
    pub column: String,
    pub kind: ColumnKind,
    pub positions: Vec<usize>,
    pub values: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct Batch<'a> {
    /// 1-based.
    pub number: usize,
    pub positions: &'a [usize],
    pub values: &'a [String],
}

impl CorrectionJob {
    #[must_use]
    pub fn batch_count(&self, max_size: usize) -> usize {
        self.values.len().div_ceil(max_size.max(1))
    }

    pub fn batches(&self, max_size: usize) -> impl Iterator<Item = Batch<'_>> {
        let max_size = max_size.max(1);
        self.positions
            .chunks(max_size)
            .zip(self.values.chunks(max_size))
            .enumerate()
            .map(|(i, (positions, values))| Batch {
                number: i + 1,
                positions,
                values,
            })
    }
}

/// Up to one job per kind for this sheet, brand first.
#[must_use]
pub fn extract_jobs(sheet: &Sheet) -> Vec<CorrectionJob> {
    let mut jobs = Vec::new();
    for kind in ColumnKind::ALL {
        let Some(col) = sheet.find_column(kind.token()) else {
            continue;
        };
        let mut positions = Vec::new();
        let mut values = Vec::new();
        for (pos, row) in sheet.rows.iter().enumerate() {
            let Some(cell) = row.get(col) else {
                continue;
            };
            if cell.is_blank() {
                continue;
            }
            positions.push(pos);
            values.push(cell.as_text());
        }
        if positions.is_empty() {
            continue;
        }
        jobs.push(CorrectionJob {
            sheet: sheet.name.clone(),
            column: sheet.columns[col].clone(),
            kind,
            positions,
            values,
        });
    }
    jobs
}

#[must_use]
pub fn extract_all_jobs(dataset: &Dataset) -> Vec<CorrectionJob> {
    dataset.sheets.iter().flat_map(extract_jobs).collect()
}

#[must_use]
pub fn total_batches(jobs: &[CorrectionJob], sizes: &ChunkSizes) -> usize {
    jobs.iter()
        .map(|j| j.batch_count(sizes.for_kind(j.kind)))
        .sum()
}
