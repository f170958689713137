//! Minimal SpreadsheetML (xlsx) reading and writing.

pub mod package;
pub mod read;
pub mod write;
pub mod xml;

pub use read::{read_workbook, read_workbook_bytes};
pub use write::{write_workbook, ExportOptions, ExportReport};
