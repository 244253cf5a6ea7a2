//! Durable shared state: work-sets and the visited-set.
//!
//! The pipeline's only inter-process communication happens through four
//! named work-sets plus a flat visited key space on an external store.
//! Each stage pops a batch, owns it locally, and re-inserts survivors,
//! which gives at-least-once delivery across crashes. Entries are opaque
//! JSON strings; identical entries collapse on insert and ordering is
//! never guaranteed.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Work-set holding page links awaiting the spider.
pub const POOL_PAGES: &str = "set:pool_pages";
/// Work-set holding PDF links awaiting the downloader.
pub const POOL_PDF: &str = "set:pool_pdf";
/// Work-set holding downloaded documents awaiting text extraction.
pub const POOL_TEXT: &str = "set:pool_text_extractor";
/// Work-set holding documents awaiting date extraction.
pub const POOL_DATE: &str = "set:pool_date_extractor";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Backend contract for the durable sets.
///
/// `set_pop` must atomically remove and return up to `count` entries, so
/// concurrent consumers never see the same entry twice.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn set_size(&self, set: &str) -> StoreResult<u64>;
    async fn set_add(&self, set: &str, entries: Vec<String>) -> StoreResult<()>;
    async fn set_pop(&self, set: &str, count: usize) -> StoreResult<Vec<String>>;

    /// Record a key in the visited space.
    async fn mark_visited(&self, key: &str) -> StoreResult<()>;
    async fn is_visited(&self, key: &str) -> StoreResult<bool>;
    /// Drop every visited key. The work-sets are left untouched.
    async fn clear_visited(&self) -> StoreResult<()>;
}

pub type SharedStore = Arc<dyn StoreBackend>;

/// Typed view over one named work-set.
pub struct Pool<T> {
    store: SharedStore,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name,
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Pool<T> {
    pub fn new(store: SharedStore, name: &'static str) -> Self {
        Self {
            store,
            name,
            _marker: PhantomData,
        }
    }

    pub async fn size(&self) -> StoreResult<u64> {
        self.store.set_size(self.name).await
    }

    pub async fn add_many(&self, items: &[T]) -> StoreResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let entries = items
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.set_add(self.name, entries).await
    }

    /// Remove and return up to `count` items. Entries that no longer decode
    /// are logged and skipped rather than wedging the set.
    pub async fn pop_many(&self, count: usize) -> StoreResult<Vec<T>> {
        let raw = self.store.set_pop(self.name, count).await?;
        let mut items = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str(&entry) {
                Ok(item) => items.push(item),
                Err(err) => {
                    tracing::warn!("dropping undecodable entry from {}: {}", self.name, err)
                }
            }
        }
        Ok(items)
    }
}

/// The visited-set: ids of URLs the spider has already enqueued or
/// descended into. Advisory only; `--reset` wipes it.
#[derive(Clone)]
pub struct VisitedSet {
    store: SharedStore,
}

impl VisitedSet {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn mark(&self, doc_id: &str) -> StoreResult<()> {
        self.store.mark_visited(doc_id).await
    }

    pub async fn contains(&self, doc_id: &str) -> StoreResult<bool> {
        self.store.is_visited(doc_id).await
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store.clear_visited().await
    }
}
