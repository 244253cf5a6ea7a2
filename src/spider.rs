//! Spider stage: frontier expansion and link classification.
//!
//! Drains the pages-pool in batches, shards each batch by host, and for each
//! link decides whether it is a PDF (routed to the pdf-pool), an in-scope
//! HTML page (parsed for child links), or noise (discarded). Child discovery
//! is bounded by `max_depth`; retries are bounded by `max_attempt`.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::Context;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::fetch::Fetcher;
use crate::models::{doc_id, Link, LinkKind};
use crate::runtime::{group_by_host, host_of, run_host_workers, Deadline};
use crate::store::{Pool, SharedStore, StoreResult, VisitedSet, POOL_PAGES, POOL_PDF};

/// Links taken from the pages-pool per batch.
const PAGE_BATCH: usize = 100;

/// Settings for one spider run.
#[derive(Debug, Clone)]
pub struct SpiderSettings {
    pub max_depth: u32,
    pub max_attempt: u32,
    pub max_threads: usize,
    pub limit_per_host: usize,
    pub timeout_minutes: u64,
}

/// One seed site record from the seeds file. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct Seed {
    pub website: String,
    pub name: String,
    pub code: String,
}

pub struct Spider {
    ctx: Arc<SpiderCtx>,
}

struct SpiderCtx {
    pages: Pool<Link>,
    pdfs: Pool<Link>,
    visited: VisitedSet,
    settings: SpiderSettings,
}

impl Spider {
    pub fn new(store: SharedStore, settings: SpiderSettings) -> Self {
        Self {
            ctx: Arc::new(SpiderCtx {
                pages: Pool::new(store.clone(), POOL_PAGES),
                pdfs: Pool::new(store.clone(), POOL_PDF),
                visited: VisitedSet::new(store),
                settings,
            }),
        }
    }

    /// Read the seeds file and enqueue each site as a depth-0 link.
    pub async fn load_seeds(&self, path: &Path) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("seeds file is not available: {}", path.display()))?;
        let seeds: Vec<Seed> = serde_json::from_str(&raw)
            .with_context(|| format!("malformed seeds file: {}", path.display()))?;

        let links: Vec<Link> = seeds
            .into_iter()
            .map(|seed| Link::seed(seed.website, seed.name, seed.code))
            .collect();

        for link in &links {
            self.ctx.visited.mark(&doc_id(&link.url)).await?;
        }
        self.ctx.pages.add_many(&links).await?;

        tracing::info!("{} seeds are added to the pages pool", links.len());
        Ok(links.len())
    }

    /// Drain the pages-pool until it is empty or the deadline passes.
    pub async fn run(&self) -> anyhow::Result<()> {
        let deadline = Deadline::from_minutes(self.ctx.settings.timeout_minutes);

        while self.ctx.pages.size().await? > 0 {
            let batch = self.ctx.pages.pop_many(PAGE_BATCH).await?;
            if batch.is_empty() {
                // Another spider drained the set between size and pop.
                continue;
            }

            let hosts = group_by_host(batch, |link| link.url.as_str());
            let ctx = self.ctx.clone();
            let results = run_host_workers(hosts, self.ctx.settings.max_threads, move |host, links| {
                let ctx = ctx.clone();
                async move { ctx.analyze_host(&host, links).await }
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

/// What became of one analyzed link.
enum LinkOutcome {
    Pdf(Link),
    Page { children: Vec<Link> },
    Failed(Link),
    Discard,
}

impl SpiderCtx {
    /// Analyze one host's slice of the batch with at most `limit_per_host`
    /// requests in flight, then flush the results to the shared pools.
    async fn analyze_host(&self, host: &str, links: Vec<Link>) -> StoreResult<()> {
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

        let fetcher = match Fetcher::new() {
            Ok(fetcher) => fetcher,
            Err(err) => {
                tracing::error!("failed to build http client: {}", err);
                return self.pages.add_many(&live).await;
            }
        };

        let outcomes = futures::stream::iter(live)
            .map(|link| self.classify(&fetcher, link))
            .buffer_unordered(self.settings.limit_per_host.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut pdf_links = Vec::new();
        let mut failed = Vec::new();
        let mut children = Vec::new();
        let mut page_count = 0usize;
        for outcome in outcomes {
            match outcome? {
                LinkOutcome::Pdf(link) => pdf_links.push(link),
                LinkOutcome::Page { children: found } => {
                    page_count += 1;
                    children.extend(found);
                }
                LinkOutcome::Failed(mut link) => {
                    link.attempt += 1;
                    if link.attempt <= self.settings.max_attempt {
                        failed.push(link);
                    } else {
                        tracing::error!("Dead link: {}", link.url);
                    }
                }
                LinkOutcome::Discard => {}
            }
        }

        self.pdfs.add_many(&pdf_links).await?;

        // New pages become visited before they are queued, so no other
        // spider enqueues them a second time.
        for child in &children {
            self.visited.mark(&doc_id(&child.url)).await?;
        }
        if !children.is_empty() {
            tracing::info!("extracted {} links from {}", children.len(), host);
        }
        let mut reinsert = children;
        reinsert.extend(failed.iter().cloned());
        self.pages.add_many(&reinsert).await?;

        tracing::info!(
            "processed {} page-links, {} pdf-links and {} failed-links from {}",
            page_count,
            pdf_links.len(),
            failed.len(),
            host
        );
        Ok(())
    }

    /// Fetch one link and decide its fate from the response headers.
    async fn classify(&self, fetcher: &Fetcher, mut link: Link) -> StoreResult<LinkOutcome> {
        let response = match fetcher.get(&link.url).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("failed to open {}: {}", link.url, err);
                return Ok(LinkOutcome::Failed(link));
            }
        };
        if !response.status.is_success() {
            tracing::warn!("{} answered {}", link.url, response.status);
            return Ok(LinkOutcome::Failed(link));
        }

        let content_type = response.content_type().unwrap_or("").to_ascii_lowercase();
        if is_pdf_response(&content_type, response.content_disposition()) {
            let id = doc_id(&link.url);
            link.kind = LinkKind::Pdf;
            link.doc_id.get_or_insert(id);
            return Ok(LinkOutcome::Pdf(link));
        }

        if content_type.contains("text/html") && same_site(&link) {
            let html = match response.text().await {
                Ok(html) => html,
                Err(err) => {
                    tracing::warn!("failed to read {}: {}", link.url, err);
                    return Ok(LinkOutcome::Failed(link));
                }
            };

            // Children of a page at max_depth would exceed the depth bound.
            if link.depth >= self.settings.max_depth {
                return Ok(LinkOutcome::Page { children: Vec::new() });
            }

            let mut children = Vec::new();
            for child in extract_page_links(&link, &html) {
                if self.visited.contains(&doc_id(&child.url)).await? {
                    continue;
                }
                children.push(child);
            }
            return Ok(LinkOutcome::Page { children });
        }

        // Neither a PDF nor in-scope HTML.
        Ok(LinkOutcome::Discard)
    }
}

/// A response is a PDF when the server says so directly, or serves an
/// octet-stream whose disposition names a .pdf file.
fn is_pdf_response(content_type: &str, disposition: Option<&str>) -> bool {
    if content_type.contains("application/pdf") {
        return true;
    }
    content_type.contains("application/octet-stream")
        && disposition.is_some_and(|d| d.to_ascii_lowercase().contains(".pdf"))
}

/// Cross-host pages are out of scope: only parse HTML served from the same
/// host as the discovering site.
fn same_site(link: &Link) -> bool {
    match (host_of(&link.url), host_of(&link.website)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

/// Extract child links from a page body.
///
/// Only root-relative hrefs are considered; each is resolved against the
/// discovering site's seed URL. The first occurrence of an absolute URL wins
/// and non-http(s) schemes are dropped.
pub fn extract_page_links(parent: &Link, html: &str) -> Vec<Link> {
    let Ok(base) = Url::parse(&parent.website) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut children = Vec::new();
    for element in document.select(&ANCHOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.starts_with('/') {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let url = resolved.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }
        children.push(parent.child(url));
    }
    children
}
