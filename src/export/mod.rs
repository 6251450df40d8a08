//! Extractor: full-table read streamed into a local CSV file

pub mod extractor;
pub mod writer;

pub use extractor::{ExportOptions, ExportSummary, export_table};
pub use writer::{ExistingFilePolicy, LineTerminator};
