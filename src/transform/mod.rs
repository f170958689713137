//! Spreadsheet-level rules applied around the correction pipeline.

pub mod derive;
pub mod prepare;
