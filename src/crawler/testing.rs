//! In-process collaborators for pipeline tests

use crate::crawler::{DownloadStreamProvider, PageRetriever};
use crate::job::{ResourceFingerprint, ResourceInfo};
use crate::page::Page;
use crate::storage::{
    content_from, ContentStream, MemoryResources, MemoryVisitedPages, ResourceRepository,
    StorageResult, UrlPattern, VisitedPageRecord, VisitedPageRepository,
};
use crate::{Result, ScrapError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

pub(crate) fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Serves fixed bodies; reloads may serve a different body
#[derive(Default)]
pub(crate) struct StaticRetriever {
    pages: HashMap<Url, String>,
    reloaded: HashMap<Url, String>,
    redirects: HashMap<Url, Url>,
    gets: AtomicUsize,
    reloads: AtomicUsize,
}

impl StaticRetriever {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page(mut self, page: &str, body: &str) -> Self {
        self.pages.insert(url(page), body.to_string());
        self
    }

    pub(crate) fn with_reloaded_page(mut self, page: &str, body: &str) -> Self {
        self.reloaded.insert(url(page), body.to_string());
        self
    }

    /// Serves `to` whenever `from` is requested
    pub(crate) fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(url(from), url(to));
        self
    }

    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    fn lookup(&self, pages: &HashMap<Url, String>, url: &Url) -> Result<Page> {
        pages
            .get(url)
            .map(|body| Page::new(url.clone(), body.as_str()))
            .ok_or_else(|| ScrapError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[async_trait]
impl PageRetriever for StaticRetriever {
    async fn get_page(&self, url: &Url) -> Result<Page> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        match self.redirects.get(url) {
            Some(target) => Ok(self.lookup(&self.pages, target)?.requested_as(url.clone())),
            None => self.lookup(&self.pages, url),
        }
    }

    async fn reload(&self, page: &Page) -> Result<Page> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.reloaded.contains_key(page.url()) {
            self.lookup(&self.reloaded, page.url())
        } else {
            self.lookup(&self.pages, page.url())
        }
    }
}

/// Returns the URL as payload after failing a set number of times
#[derive(Default)]
pub(crate) struct FlakyDownloader {
    failures: AtomicUsize,
    broken_bodies: AtomicUsize,
    calls: Mutex<Vec<Url>>,
}

impl FlakyDownloader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    /// Starts the first `count` bodies and breaks them off after one chunk
    pub(crate) fn breaking_off(count: usize) -> Self {
        Self {
            broken_bodies: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Url> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownloadStreamProvider for FlakyDownloader {
    async fn get_stream(&self, url: &Url) -> Result<ContentStream> {
        self.calls.lock().unwrap().push(url.clone());

        if take_one(&self.failures) {
            return Err(ScrapError::HttpStatus {
                url: url.to_string(),
                status: 503,
            });
        }

        if take_one(&self.broken_bodies) {
            return Ok(stream::iter(vec![
                Ok(Bytes::from(url.to_string())),
                Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "body ended early",
                )),
            ])
            .boxed());
        }

        Ok(content_from(url.to_string()))
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Memory resource store that records every call
#[derive(Default)]
pub(crate) struct CountingResources {
    pub(crate) inner: MemoryResources,
    exists: Mutex<Vec<ResourceFingerprint>>,
    upserts: Mutex<Vec<ResourceFingerprint>>,
}

impl CountingResources {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn exists_calls(&self) -> Vec<ResourceFingerprint> {
        self.exists.lock().unwrap().clone()
    }

    pub(crate) fn upserts(&self) -> Vec<ResourceFingerprint> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceRepository for CountingResources {
    async fn exists(&self, info: &ResourceInfo) -> StorageResult<bool> {
        self.exists.lock().unwrap().push(info.fingerprint());
        self.inner.exists(info).await
    }

    async fn upsert(&self, info: &ResourceInfo, content: ContentStream) -> StorageResult<()> {
        self.upserts.lock().unwrap().push(info.fingerprint());
        self.inner.upsert(info, content).await
    }

    async fn key(&self, info: &ResourceInfo) -> StorageResult<String> {
        self.inner.key(info).await
    }
}

/// Memory visited-page store that records upserts
#[derive(Default)]
pub(crate) struct CountingVisited {
    pub(crate) inner: MemoryVisitedPages,
    upserts: Mutex<Vec<String>>,
}

impl CountingVisited {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn upserts(&self) -> Vec<String> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisitedPageRepository for CountingVisited {
    async fn exists(&self, url: &Url) -> StorageResult<bool> {
        self.inner.exists(url).await
    }

    async fn upsert(&self, url: &Url) -> StorageResult<()> {
        self.upserts.lock().unwrap().push(url.to_string());
        self.inner.upsert(url).await
    }

    async fn search(&self, pattern: &UrlPattern) -> StorageResult<Vec<VisitedPageRecord>> {
        self.inner.search(pattern).await
    }

    async fn delete(&self, pattern: &UrlPattern) -> StorageResult<u64> {
        self.inner.delete(pattern).await
    }
}
