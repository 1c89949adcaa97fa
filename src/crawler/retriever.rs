//! HTTP page retrieval and resource downloads
//!
//! This module handles all HTTP requests for the scraper, including:
//! - Building HTTP clients from a job's HTTP policy
//! - GET requests for pages and resource bytes
//! - Retry with a fixed delay for transient failures
//! - An optional, bounded in-memory page cache that reloads bypass
//! - Streaming of resource bodies

use crate::job::HttpPolicy;
use crate::page::Page;
use crate::storage::ContentStream;
use crate::{Result, ScrapError};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Fetches documents as [`Page`]s
#[async_trait]
pub trait PageRetriever: Send + Sync {
    /// Fetches the page at `url`, possibly from a cache
    async fn get_page(&self, url: &Url) -> Result<Page>;

    /// Fetches the page again, bypassing any cache
    async fn reload(&self, page: &Page) -> Result<Page>;
}

/// Streams the bytes of a downloadable resource
#[async_trait]
pub trait DownloadStreamProvider: Send + Sync {
    /// Starts the download
    ///
    /// Request failures are returned here; the body arrives as the stream is
    /// polled, and a body that breaks off ends the stream with an IO error.
    async fn get_stream(&self, url: &Url) -> Result<ContentStream>;
}

/// Most pages a caching retriever keeps
pub const PAGE_CACHE_CAPACITY: usize = 256;

/// Builds an HTTP client with the policy's user agent and timeout
///
/// # Example
///
/// ```
/// use xscrape::crawler::build_http_client;
/// use xscrape::job::HttpPolicy;
///
/// let client = build_http_client(&HttpPolicy::default()).unwrap();
/// ```
pub fn build_http_client(policy: &HttpPolicy) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(policy.user_agent.as_str())
        .timeout(policy.timeout)
        .connect_timeout(policy.timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Sends a GET request, retrying transient failures
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 2xx | Return the response |
/// | HTTP 429 / 5xx | Retry after the policy delay |
/// | Timeout / connection error | Retry after the policy delay |
/// | Anything else | Fail immediately |
async fn get_with_retry(client: &Client, url: &Url, policy: &HttpPolicy) -> Result<Response> {
    let attempts = policy.retries.saturating_add(1);
    let mut attempt = 1;

    loop {
        let error = match client.get(url.clone()).send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => ScrapError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            },
            Err(source) => ScrapError::Http {
                url: url.to_string(),
                source,
            },
        };

        if attempt >= attempts || !is_transient(&error) {
            return Err(error);
        }

        warn!(
            "Attempt {}/{} for {} failed: {}; retrying in {:?}",
            attempt, attempts, url, error, policy.retry_delay
        );
        tokio::time::sleep(policy.retry_delay).await;
        attempt += 1;
    }
}

fn is_transient(error: &ScrapError) -> bool {
    match error {
        ScrapError::HttpStatus { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
        }
        ScrapError::Http { source, .. } => source.is_timeout() || source.is_connect(),
        _ => false,
    }
}

/// Recently fetched pages; the oldest entry goes first once full
struct PageCache {
    pages: HashMap<Url, Page>,
    order: VecDeque<Url>,
    capacity: usize,
}

impl PageCache {
    fn new(capacity: usize) -> Self {
        Self {
            pages: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, url: &Url) -> Option<Page> {
        self.pages.get(url).cloned()
    }

    fn insert(&mut self, url: Url, page: Page) {
        if self.pages.insert(url.clone(), page).is_none() {
            self.order.push_back(url);
        }

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.pages.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pages.len()
    }
}

/// Page retriever over HTTP
///
/// With caching enabled, up to [`PAGE_CACHE_CAPACITY`] pages are kept for
/// the life of the retriever.
pub struct HttpPageRetriever {
    client: Client,
    policy: HttpPolicy,
    cache: Option<Mutex<PageCache>>,
}

impl HttpPageRetriever {
    pub fn new(policy: &HttpPolicy) -> Result<Self> {
        Ok(Self::with_client(build_http_client(policy)?, policy))
    }

    /// Uses an existing client; the policy still drives retries and caching
    pub fn with_client(client: Client, policy: &HttpPolicy) -> Self {
        Self {
            client,
            policy: policy.clone(),
            cache: policy
                .cache
                .then(|| Mutex::new(PageCache::new(PAGE_CACHE_CAPACITY))),
        }
    }

    fn cached(&self, url: &Url) -> Option<Page> {
        let cache = self.cache.as_ref()?.lock().ok()?;
        cache.get(url)
    }

    fn remember(&self, url: &Url, page: &Page) {
        if let Some(Ok(mut cache)) = self.cache.as_ref().map(Mutex::lock) {
            cache.insert(url.clone(), page.clone());
            if page.url() != url {
                cache.insert(page.url().clone(), page.clone());
            }
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Page> {
        let response = get_with_retry(&self.client, url, &self.policy).await?;
        // Redirects change the canonical URL of the page
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|source| ScrapError::Http {
            url: url.to_string(),
            source,
        })?;

        debug!("Fetched {} ({} bytes)", final_url, body.len());
        Ok(Page::new(final_url, body).requested_as(url.clone()))
    }
}

#[async_trait]
impl PageRetriever for HttpPageRetriever {
    async fn get_page(&self, url: &Url) -> Result<Page> {
        if let Some(page) = self.cached(url) {
            debug!("Cache hit for {}", url);
            return Ok(page);
        }

        let page = self.fetch(url).await?;
        self.remember(url, &page);
        Ok(page)
    }

    async fn reload(&self, page: &Page) -> Result<Page> {
        debug!("Reloading {}", page.url());
        let fresh = self.fetch(page.url()).await?;
        self.remember(page.url(), &fresh);
        Ok(fresh)
    }
}

/// Resource downloads over HTTP
pub struct HttpDownloader {
    client: Client,
    policy: HttpPolicy,
}

impl HttpDownloader {
    pub fn new(policy: &HttpPolicy) -> Result<Self> {
        Ok(Self::with_client(build_http_client(policy)?, policy))
    }

    pub fn with_client(client: Client, policy: &HttpPolicy) -> Self {
        Self {
            client,
            policy: policy.clone(),
        }
    }
}

#[async_trait]
impl DownloadStreamProvider for HttpDownloader {
    async fn get_stream(&self, url: &Url) -> Result<ContentStream> {
        let response = get_with_retry(&self.client, url, &self.policy).await?;

        match response.content_length() {
            Some(length) => debug!("Downloading {} ({} bytes)", url, length),
            None => debug!("Downloading {}", url),
        }

        Ok(response
            .bytes_stream()
            .map_err(|source| io::Error::new(io::ErrorKind::Other, source))
            .boxed())
    }
}
