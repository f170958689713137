/// Failure of a single call to the text-generation service.
///
/// Callers treat every variant as a total failure of the batch that issued the call.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("api key not found: environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authentication rejected (HTTP {0})")]
    Auth(u16),
    #[error("rate limited (gave up after {0} attempts)")]
    RateLimited(usize),
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// The dataset does not have the shape the pipeline needs.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("no 'brand' or 'description' columns with processable data found")]
    NoEligibleColumns,
    #[error("unknown sheet: {0}")]
    UnknownSheet(String),
    #[error("unknown column '{column}' in sheet '{sheet}'")]
    UnknownColumn { sheet: String, column: String },
    #[error("row {row} out of range for sheet '{sheet}' ({rows} rows)")]
    RowOutOfRange {
        sheet: String,
        row: usize,
        rows: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error(
    "column '{column}' in sheet '{sheet}' was not updated: {positions} row positions vs {corrected} corrected values"
)]
pub struct MergeIntegrityError {
    pub sheet: String,
    pub column: String,
    pub positions: usize,
    pub corrected: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error(transparent)]
    Integrity(#[from] MergeIntegrityError),
    #[error(transparent)]
    Structure(#[from] StructuralError),
}
