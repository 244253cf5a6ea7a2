//! In-memory store backend for tests and single-process runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{StoreBackend, StoreResult};

#[derive(Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<String, HashSet<String>>>,
    visited: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn set_size(&self, set: &str) -> StoreResult<u64> {
        let sets = self.sets.lock().await;
        Ok(sets.get(set).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn set_add(&self, set: &str, entries: Vec<String>) -> StoreResult<()> {
        let mut sets = self.sets.lock().await;
        sets.entry(set.to_string()).or_default().extend(entries);
        Ok(())
    }

    async fn set_pop(&self, set: &str, count: usize) -> StoreResult<Vec<String>> {
        let mut sets = self.sets.lock().await;
        let Some(members) = sets.get_mut(set) else {
            return Ok(Vec::new());
        };
        let picked: Vec<String> = members.iter().take(count).cloned().collect();
        for entry in &picked {
            members.remove(entry);
        }
        Ok(picked)
    }

    async fn mark_visited(&self, key: &str) -> StoreResult<()> {
        self.visited.lock().await.insert(key.to_string());
        Ok(())
    }

    async fn is_visited(&self, key: &str) -> StoreResult<bool> {
        Ok(self.visited.lock().await.contains(key))
    }

    async fn clear_visited(&self) -> StoreResult<()> {
        self.visited.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::{Pool, SharedStore, VisitedSet, POOL_PAGES};

    fn store() -> SharedStore {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_add_pop_roundtrip() {
        let pool: Pool<String> = Pool::new(store(), POOL_PAGES);
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        pool.add_many(&items).await.unwrap();
        assert_eq!(pool.size().await.unwrap(), 3);

        let mut popped = pool.pop_many(10).await.unwrap();
        popped.sort();
        assert_eq!(popped, items);
        assert_eq!(pool.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_entries_collapse() {
        let pool: Pool<String> = Pool::new(store(), POOL_PAGES);
        pool.add_many(&["a".to_string(), "a".to_string()])
            .await
            .unwrap();
        pool.add_many(&["a".to_string()]).await.unwrap();
        assert_eq!(pool.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pop_many_is_bounded() {
        let pool: Pool<u32> = Pool::new(store(), POOL_PAGES);
        pool.add_many(&[1, 2, 3, 4, 5]).await.unwrap();
        let popped = pool.pop_many(2).await.unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(pool.size().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_visited_mark_contains_clear() {
        let visited = VisitedSet::new(store());
        assert!(!visited.contains("k").await.unwrap());
        visited.mark("k").await.unwrap();
        assert!(visited.contains("k").await.unwrap());
        visited.clear().await.unwrap();
        assert!(!visited.contains("k").await.unwrap());
    }
}
