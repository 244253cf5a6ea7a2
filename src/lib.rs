//! pdfharvest - distributed PDF harvesting pipeline.
//!
//! Four cooperating stages drain durable work-sets hosted on Redis:
//! the spider expands a frontier of page links and routes PDF links to the
//! downloader, the downloader fetches PDF bodies to disk, the text extractor
//! mines them into plain text, and the date extractor tags each document with
//! an inferred publication date before persisting it as JSON. Stages are
//! independent processes and may run multiply, on separate machines.

pub mod cli;
pub mod dates;
pub mod download;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod pdf;
pub mod runtime;
pub mod spider;
pub mod store;
