//! Extractor stages: PDF-to-text conversion and publication-date tagging.

mod date;
mod text;

pub use date::{DateExtractor, DateSettings, UNKNOWN_DATE};
pub use text::{TextExtractor, TextSettings};

/// Documents taken from a pool per worker batch.
pub(crate) const DOC_BATCH: usize = 50;
