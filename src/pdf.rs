//! PDF text mining backend.
//!
//! The pipeline treats PDF rendering as a black box with two questions:
//! how much of the page area is covered by text blocks, and what is the
//! plain text of each page. The production backend drives poppler's
//! pdftotext binary; tests substitute their own miner.

use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Fraction of page area covered by text below which a PDF is considered a
/// scan. Born-digital PDFs sit far above this; image-only scans at zero.
pub const SCANNED_COVERAGE_THRESHOLD: f64 = 0.01;

/// Text stored for image-only PDFs instead of running OCR.
pub const SCANNED_SENTINEL: &str = "scanned PDF";

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("failed to mine pdf: {0}")]
    Mining(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Black-box access to a PDF's text layer.
pub trait PdfMiner: Send + Sync {
    /// Ratio of text-block area to page area across the whole document.
    fn coverage(&self, path: &Path) -> Result<f64, PdfError>;

    /// Plain text of every page, in page order.
    fn page_texts(&self, path: &Path) -> Result<Vec<String>, PdfError>;
}

/// Convert one downloaded PDF into text.
///
/// PDFs whose text layer covers less than 1% of the page area are tagged
/// with the scanned sentinel; OCR is out of scope here.
pub fn pdf_to_text(miner: &dyn PdfMiner, path: &Path) -> Result<String, PdfError> {
    let coverage = miner.coverage(path)?;
    if coverage < SCANNED_COVERAGE_THRESHOLD {
        return Ok(SCANNED_SENTINEL.to_string());
    }
    Ok(miner.page_texts(path)?.join("\n"))
}

/// Poppler-backed miner shelling out to pdftotext.
#[derive(Debug, Default, Clone, Copy)]
pub struct PopplerMiner;

impl PopplerMiner {
    fn run_pdftotext(&self, args: &[&str], path: &Path) -> Result<String, PdfError> {
        let output = Command::new("pdftotext")
            .args(args)
            .arg(path)
            .arg("-") // write to stdout
            .output();

        match output {
            Ok(out) if out.status.success() => {
                Ok(String::from_utf8_lossy(&out.stdout).into_owned())
            }
            Ok(out) => Err(PdfError::Mining(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            )),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(PdfError::ToolNotFound(
                "pdftotext (install poppler-utils)".to_string(),
            )),
            Err(err) => Err(PdfError::Io(err)),
        }
    }
}

impl PdfMiner for PopplerMiner {
    fn coverage(&self, path: &Path) -> Result<f64, PdfError> {
        let bbox = self.run_pdftotext(&["-bbox-layout"], path)?;
        parse_coverage(&bbox)
    }

    fn page_texts(&self, path: &Path) -> Result<Vec<String>, PdfError> {
        let text = self.run_pdftotext(&["-enc", "UTF-8"], path)?;
        Ok(split_pages(&text))
    }
}

static PAGE_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<page\s+width="([0-9.]+)"\s+height="([0-9.]+)""#).expect("page regex")
});
static BLOCK_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<block\s+xMin="(-?[0-9.]+)"\s+yMin="(-?[0-9.]+)"\s+xMax="(-?[0-9.]+)"\s+yMax="(-?[0-9.]+)""#,
    )
    .expect("block regex")
});

/// Parse the XHTML that `pdftotext -bbox-layout` emits, accumulating page
/// and text-block areas into a coverage ratio.
fn parse_coverage(bbox_xml: &str) -> Result<f64, PdfError> {
    let mut page_area = 0.0f64;
    for caps in PAGE_BOX.captures_iter(bbox_xml) {
        let width: f64 = caps[1].parse().unwrap_or(0.0);
        let height: f64 = caps[2].parse().unwrap_or(0.0);
        page_area += (width * height).abs();
    }
    if page_area <= 0.0 {
        return Err(PdfError::Mining("document has zero page area".to_string()));
    }

    let mut text_area = 0.0f64;
    for caps in BLOCK_BOX.captures_iter(bbox_xml) {
        let x_min: f64 = caps[1].parse().unwrap_or(0.0);
        let y_min: f64 = caps[2].parse().unwrap_or(0.0);
        let x_max: f64 = caps[3].parse().unwrap_or(0.0);
        let y_max: f64 = caps[4].parse().unwrap_or(0.0);
        text_area += ((x_max - x_min) * (y_max - y_min)).abs();
    }

    Ok(text_area / page_area)
}

/// pdftotext separates pages with form feeds; the trailing one yields an
/// empty tail that is not a page.
fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\u{0c}').map(str::to_string).collect();
    if pages.last().is_some_and(|last| last.is_empty()) {
        pages.pop();
    }
    pages
}
