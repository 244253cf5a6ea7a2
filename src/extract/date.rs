//! Date extraction stage: tag documents and persist them as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use crate::dates::search_dates;
use crate::models::Document;
use crate::runtime::{run_worker_pool, worker_count, Deadline};
use crate::store::{Pool, SharedStore, StoreResult, POOL_DATE};

use super::DOC_BATCH;

/// Publication date recorded when the text mentions no date at all.
pub const UNKNOWN_DATE: &str = "[UNKNOWN]";

/// Settings for one date-extractor run.
#[derive(Debug, Clone)]
pub struct DateSettings {
    pub saved_path: PathBuf,
    pub max_processors: usize,
    pub max_threads: usize,
    pub timeout_minutes: u64,
}

pub struct DateExtractor {
    ctx: Arc<DateCtx>,
}

struct DateCtx {
    dates: Pool<Document>,
    settings: DateSettings,
}

impl DateExtractor {
    pub fn new(store: SharedStore, settings: DateSettings) -> Self {
        Self {
            ctx: Arc::new(DateCtx {
                dates: Pool::new(store, POOL_DATE),
                settings,
            }),
        }
    }

    /// Drain the date-pool with a pool of workers until it is empty or the
    /// deadline passes.
    pub async fn run(&self) -> anyhow::Result<()> {
        let deadline = Deadline::from_minutes(self.ctx.settings.timeout_minutes);
        let workers = worker_count(self.ctx.settings.max_processors);

        let ctx = self.ctx.clone();
        let results = run_worker_pool(workers, move |_worker_id| {
            let ctx = ctx.clone();
            async move { ctx.drain(deadline).await }
        })
        .await;

        let mut timed_out = false;
        for result in results {
            timed_out |= result?;
        }

        if timed_out {
            tracing::info!("Exit - time over");
        } else {
            tracing::info!("Exit - Done");
        }
        Ok(())
    }
}

impl DateCtx {
    /// Worker loop; returns true if the deadline cut it short.
    async fn drain(&self, deadline: Deadline) -> StoreResult<bool> {
        use futures::StreamExt;

        loop {
            let batch = self.dates.pop_many(DOC_BATCH).await?;
            if batch.is_empty() {
                return Ok(false);
            }

            let saved = futures::stream::iter(batch)
                .map(|document| self.finalize(document))
                .buffer_unordered(self.settings.max_threads.max(1))
                .collect::<Vec<_>>()
                .await;
            let saved_count = saved.into_iter().flatten().count();

            tracing::info!("{} JSON files are saved", saved_count);

            if deadline.expired() {
                return Ok(true);
            }
        }
    }

    /// Tag one document with its publication date and write the final JSON
    /// record. The first date mentioned in the text wins.
    async fn finalize(&self, mut document: Document) -> Option<()> {
        let text = document.text.get_or_insert_with(String::new).clone();

        let publication_date = search_dates(&text)
            .first()
            .map(|m| m.date.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| UNKNOWN_DATE.to_string());
        document.publication_date = Some(publication_date);

        let path = self
            .settings
            .saved_path
            .join(format!("{}.json", document.doc_id));
        let payload = match serde_json::to_vec(&document) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!("failed to serialize {}: {}", document.doc_id, err);
                return None;
            }
        };

        match tokio::fs::write(&path, payload).await {
            Ok(()) => Some(()),
            Err(err) => {
                tracing::error!("failed to save {}: {}", path.display(), err);
                None
            }
        }
    }
}
