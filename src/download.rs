//! Downloader stage: fetch queued PDF links to disk.
//!
//! Mirrors the spider's batch/host-shard scaffold. A successful download
//! turns the link into a document seed on the text-pool; transient failures
//! go back to the pdf-pool with their attempt counter bumped.

use std::path::PathBuf;
use std::sync::Arc;

use crate::fetch::Fetcher;
use crate::models::{Document, Link};
use crate::runtime::{group_by_host, run_host_workers, Deadline};
use crate::store::{Pool, SharedStore, StoreResult, POOL_PDF, POOL_TEXT};

/// Links taken from the pdf-pool per batch.
const PDF_BATCH: usize = 100;

/// Settings for one downloader run.
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub download_path: PathBuf,
    pub max_attempt: u32,
    pub max_threads: usize,
    pub limit_per_host: usize,
    pub timeout_minutes: u64,
}

pub struct Downloader {
    ctx: Arc<DownloadCtx>,
}

struct DownloadCtx {
    pdfs: Pool<Link>,
    texts: Pool<Document>,
    settings: DownloadSettings,
}

impl Downloader {
    pub fn new(store: SharedStore, settings: DownloadSettings) -> Self {
        Self {
            ctx: Arc::new(DownloadCtx {
                pdfs: Pool::new(store.clone(), POOL_PDF),
                texts: Pool::new(store, POOL_TEXT),
                settings,
            }),
        }
    }

    /// Drain the pdf-pool until it is empty or the deadline passes.
    pub async fn run(&self) -> anyhow::Result<()> {
        let deadline = Deadline::from_minutes(self.ctx.settings.timeout_minutes);

        while self.ctx.pdfs.size().await? > 0 {
            let batch = self.ctx.pdfs.pop_many(PDF_BATCH).await?;
            if batch.is_empty() {
                continue;
            }

            let hosts = group_by_host(batch, |link| link.url.as_str());
            let ctx = self.ctx.clone();
            let results = run_host_workers(hosts, self.ctx.settings.max_threads, move |host, links| {
                let ctx = ctx.clone();
                async move { ctx.download_host(&host, links).await }
            })
            .await;
            for result in results {
                result?;
            }

            if deadline.expired() {
                tracing::info!("Exit - time over");
                return Ok(());
            }
        }

        tracing::info!("Exit - Done");
        Ok(())
    }
}

enum DownloadOutcome {
    Done(Link),
    Failed(Link),
    /// Unrecoverable (disk write failed); the link is not retried.
    Dropped,
}

impl DownloadCtx {
    /// Download one host's slice with at most `limit_per_host` requests in
    /// flight, then flush results to the shared pools.
    async fn download_host(&self, host: &str, links: Vec<Link>) -> StoreResult<()> {
        use futures::StreamExt;

        let mut live = Vec::new();
        for link in links {
            if link.attempt >= self.settings.max_attempt {
                tracing::error!("Dead link: {}", link.url);
                continue;
            }
            live.push(link);
        }
        if live.is_empty() {
            return Ok(());
        }

        tracing::info!("starting download of {} PDFs from {}", live.len(), host);

        let fetcher = match Fetcher::new() {
            Ok(fetcher) => fetcher,
            Err(err) => {
                tracing::error!("failed to build http client: {}", err);
                return self.pdfs.add_many(&live).await;
            }
        };

        let outcomes = futures::stream::iter(live)
            .map(|link| self.download_one(&fetcher, link))
            .buffer_unordered(self.settings.limit_per_host.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut failed = Vec::new();
        let mut documents = Vec::new();
        for outcome in outcomes {
            match outcome {
                DownloadOutcome::Done(link) => documents.push(Document::from_downloaded(&link)),
                DownloadOutcome::Failed(mut link) => {
                    link.attempt += 1;
                    if link.attempt <= self.settings.max_attempt {
                        failed.push(link);
                    } else {
                        tracing::error!("Dead link: {}", link.url);
                    }
                }
                DownloadOutcome::Dropped => {}
            }
        }

        self.pdfs.add_many(&failed).await?;
        self.texts.add_many(&documents).await?;

        tracing::info!(
            "downloaded {} PDFs ({} failed) from {}",
            documents.len(),
            failed.len(),
            host
        );
        Ok(())
    }

    /// Fetch one PDF to `<download_path>/<doc_id>.pdf`.
    async fn download_one(&self, fetcher: &Fetcher, mut link: Link) -> DownloadOutcome {
        link.ensure_doc_id();
        let file_name = format!("{}.pdf", link.doc_id.as_deref().unwrap_or_default());
        let file_path = self.settings.download_path.join(file_name);

        tracing::info!("downloading {}", link.url);

        let response = match fetcher.get(&link.url).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!("failed to download {}: {}", link.url, err);
                return DownloadOutcome::Failed(link);
            }
        };

        // The request may have been redirected; record where it landed.
        link.url = response.final_url.clone();

        if response.status != reqwest::StatusCode::OK {
            tracing::error!(
                "failed to download {} status-code: {}",
                link.url,
                response.status
            );
            return DownloadOutcome::Failed(link);
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                tracing::error!("failed to read body of {}: {}", link.url, err);
                return DownloadOutcome::Failed(link);
            }
        };

        if let Err(err) = tokio::fs::write(&file_path, &body).await {
            tracing::error!("failed to write {}: {}", file_path.display(), err);
            return DownloadOutcome::Dropped;
        }

        DownloadOutcome::Done(link)
    }
}
