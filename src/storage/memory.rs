//! In-process stores
//!
//! Nothing here outlives the process. Useful for one-off runs and tests.

use crate::job::{ResourceFingerprint, ResourceInfo};
use crate::storage::traits::{
    ContentStream, ResourceRepository, StorageError, StorageResult, VisitedPageRepository,
};
use crate::storage::{UrlPattern, VisitedPageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use url::Url;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Database("store lock poisoned".to_string()))
}

/// Visited pages kept in memory
#[derive(Debug, Default)]
pub struct MemoryVisitedPages {
    pages: Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl MemoryVisitedPages {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VisitedPageRepository for MemoryVisitedPages {
    async fn exists(&self, url: &Url) -> StorageResult<bool> {
        Ok(lock(&self.pages)?.contains_key(url.as_str()))
    }

    async fn upsert(&self, url: &Url) -> StorageResult<()> {
        lock(&self.pages)?.insert(url.to_string(), Utc::now());
        Ok(())
    }

    async fn search(&self, pattern: &UrlPattern) -> StorageResult<Vec<VisitedPageRecord>> {
        Ok(lock(&self.pages)?
            .iter()
            .filter(|(url, _)| pattern.matches(url))
            .map(|(url, visited_at)| VisitedPageRecord {
                url: url.clone(),
                visited_at: *visited_at,
            })
            .collect())
    }

    async fn delete(&self, pattern: &UrlPattern) -> StorageResult<u64> {
        let mut pages = lock(&self.pages)?;
        let before = pages.len();
        pages.retain(|url, _| !pattern.matches(url));
        Ok((before - pages.len()) as u64)
    }
}

/// Resources kept in memory, keyed by fingerprint
#[derive(Debug, Default)]
pub struct MemoryResources {
    entries: Mutex<HashMap<ResourceFingerprint, Vec<u8>>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored content of a resource
    pub fn get(&self, info: &ResourceInfo) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&info.fingerprint()).cloned())
    }

    /// Number of stored resources
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResourceRepository for MemoryResources {
    async fn exists(&self, info: &ResourceInfo) -> StorageResult<bool> {
        Ok(lock(&self.entries)?.contains_key(&info.fingerprint()))
    }

    async fn upsert(&self, info: &ResourceInfo, content: ContentStream) -> StorageResult<()> {
        let content = content
            .try_fold(Vec::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await?;

        lock(&self.entries)?.insert(info.fingerprint(), content);
        Ok(())
    }

    async fn key(&self, info: &ResourceInfo) -> StorageResult<String> {
        Ok(format!("{}#{}:{}", info.page.url(), info.index, info.url))
    }
}
