use std::fmt;

use super::jobs::ColumnKind;

/// How a batch result deviated from a clean, exactly-sized response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Repair {
    /// No data lines; the original values were kept.
    EmptyResponse,
    /// Extra trailing lines were dropped.
    Truncated { expected: usize, got: usize },
    /// Missing trailing lines were filled from the original batch tail.
    Padded { expected: usize, got: usize },
    /// Row count mismatch in strict mode; the original values were kept.
    Rejected { expected: usize, got: usize },
    /// The service call failed; the original values were kept.
    ServiceFailure(String),
}

impl Repair {
    /// True when no corrected value from this batch survived.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Repair::EmptyResponse | Repair::Rejected { .. } | Repair::ServiceFailure(_)
        )
    }
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repair::EmptyResponse => write!(f, "empty response, using original values"),
            Repair::Truncated { expected, got } => {
                write!(f, "expected {expected} rows, got {got}; extra rows dropped")
            }
            Repair::Padded { expected, got } => {
                write!(f, "expected {expected} rows, got {got}; padded with original values")
            }
            Repair::Rejected { expected, got } => {
                write!(f, "expected {expected} rows, got {got}; using original values")
            }
            Repair::ServiceFailure(err) => write!(f, "service error: {err}; using original values"),
        }
    }
}

/// A batch result with exactly as many values as the input batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciled {
    pub values: Vec<String>,
    pub repair: Option<Repair>,
}

impl Reconciled {
    pub fn fallback(batch: &[String], repair: Repair) -> Self {
        Self {
            values: batch.to_vec(),
            repair: Some(repair),
        }
    }
}

/// Removes an opening fence line (optionally tagged, e.g. "```csv") and a closing fence.
pub fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        let (first_line, after) = match rest.find('\n') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        let tag = first_line.trim();
        if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            s = after.trim();
        }
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim();
    }
    s
}

/// Data lines of a response: fence removed, each line trimmed, header line dropped when
/// it matches the kind's token.
#[must_use]
pub fn parse_rows(raw: &str, kind: ColumnKind) -> Vec<String> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = body.lines().map(|l| l.trim().to_string()).collect();
    if lines
        .first()
        .is_some_and(|first| first.to_lowercase() == kind.token())
    {
        lines.remove(0);
    }
    lines
}

/// Turns a raw response into exactly `batch.len()` values.
///
/// A short response is assumed to be missing its trailing rows; those are taken from
/// the tail of `batch`. With `strict`, any row-count mismatch keeps `batch` instead.
#[must_use]
pub fn reconcile(raw: &str, kind: ColumnKind, batch: &[String], strict: bool) -> Reconciled {
    let mut rows = parse_rows(raw, kind);
    let expected = batch.len();
    let got = rows.len();

    if rows.is_empty() && !batch.is_empty() {
        return Reconciled::fallback(batch, Repair::EmptyResponse);
    }
    if got == expected {
        return Reconciled {
            values: rows,
            repair: None,
        };
    }
    if strict {
        return Reconciled::fallback(batch, Repair::Rejected { expected, got });
    }

    let repair = if got > expected {
        rows.truncate(expected);
        Repair::Truncated { expected, got }
    } else {
        rows.extend_from_slice(&batch[got..]);
        Repair::Padded { expected, got }
    };
    Reconciled {
        values: rows,
        repair: Some(repair),
    }
}
