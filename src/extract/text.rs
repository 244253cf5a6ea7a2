//! Text extraction stage: turn downloaded PDFs into plain text.

use std::path::PathBuf;
use std::sync::Arc;

use crate::models::Document;
use crate::pdf::{pdf_to_text, PdfMiner};
use crate::runtime::{run_worker_pool, worker_count, Deadline};
use crate::store::{Pool, SharedStore, StoreResult, POOL_DATE, POOL_TEXT};

use super::DOC_BATCH;

/// Settings for one text-extractor run.
#[derive(Debug, Clone)]
pub struct TextSettings {
    pub download_path: PathBuf,
    pub max_processors: usize,
    pub max_threads: usize,
    pub timeout_minutes: u64,
}

pub struct TextExtractor {
    ctx: Arc<TextCtx>,
}

struct TextCtx {
    texts: Pool<Document>,
    dates: Pool<Document>,
    miner: Arc<dyn PdfMiner>,
    settings: TextSettings,
}

impl TextExtractor {
    pub fn new(store: SharedStore, miner: Arc<dyn PdfMiner>, settings: TextSettings) -> Self {
        Self {
            ctx: Arc::new(TextCtx {
                texts: Pool::new(store.clone(), POOL_TEXT),
                dates: Pool::new(store, POOL_DATE),
                miner,
                settings,
            }),
        }
    }

    /// Drain the text-pool with a pool of workers until it is empty or the
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

impl TextCtx {
    /// Worker loop: pop a batch, mine each PDF with bounded concurrency,
    /// push the survivors onward. Returns true if the deadline cut it short.
    async fn drain(&self, deadline: Deadline) -> StoreResult<bool> {
        use futures::StreamExt;

        loop {
            let batch = self.texts.pop_many(DOC_BATCH).await?;
            if batch.is_empty() {
                return Ok(false);
            }
            tracing::info!("converting {} PDFs", batch.len());

            let mined = futures::stream::iter(batch)
                .map(|document| self.mine_one(document))
                .buffer_unordered(self.settings.max_threads.max(1))
                .collect::<Vec<_>>()
                .await;
            let documents: Vec<Document> = mined.into_iter().flatten().collect();

            self.dates.add_many(&documents).await?;
            tracing::info!("added {} documents to the date pool", documents.len());

            if deadline.expired() {
                return Ok(true);
            }
        }
    }

    /// Mine one document's PDF. Failures drop the document; a bad file will
    /// not get better on retry.
    async fn mine_one(&self, mut document: Document) -> Option<Document> {
        let path = self
            .settings
            .download_path
            .join(format!("{}.pdf", document.doc_id));
        let miner = self.miner.clone();

        let mined =
            tokio::task::spawn_blocking(move || pdf_to_text(miner.as_ref(), &path)).await;

        match mined {
            Ok(Ok(text)) => {
                document.text = Some(text);
                Some(document)
            }
            Ok(Err(err)) => {
                tracing::error!("failed to convert {}: {}", document.doc_id, err);
                None
            }
            Err(err) => {
                tracing::error!("pdf mining task failed for {}: {}", document.doc_id, err);
                None
            }
        }
    }
}
