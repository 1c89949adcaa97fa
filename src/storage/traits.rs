//! Storage traits and error types
//!
//! This module defines the trait interfaces for the visited-page and resource
//! stores, and the associated error types.

use crate::job::ResourceInfo;
use crate::storage::{UrlPattern, VisitedPageRecord};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use url::Url;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot resolve destination for {url}: {message}")]
    Destination { url: String, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Resource payload, delivered chunk by chunk
pub type ContentStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Wraps a payload that is already in memory
pub fn content_from(bytes: impl Into<Bytes>) -> ContentStream {
    stream::once(futures::future::ready(Ok(bytes.into()))).boxed()
}

/// Persisted set of pages that were fully processed
#[async_trait]
pub trait VisitedPageRepository: Send + Sync {
    /// Returns true if the page was marked visited
    async fn exists(&self, url: &Url) -> StorageResult<bool>;

    /// Marks a page visited, refreshing the timestamp if it already was
    async fn upsert(&self, url: &Url) -> StorageResult<()>;

    /// Lists visited pages whose URL matches the pattern, ordered by URL
    async fn search(&self, pattern: &UrlPattern) -> StorageResult<Vec<VisitedPageRecord>>;

    /// Forgets visited pages whose URL matches the pattern
    ///
    /// Returns the number of records removed.
    async fn delete(&self, pattern: &UrlPattern) -> StorageResult<u64>;
}

/// Backend that stores extracted resources
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Returns true if the resource was already written
    async fn exists(&self, info: &ResourceInfo) -> StorageResult<bool>;

    /// Writes the resource, replacing any previous content
    ///
    /// A stream that fails part-way must not leave a resource that
    /// [`exists`](Self::exists) reports.
    async fn upsert(&self, info: &ResourceInfo, content: ContentStream) -> StorageResult<()>;

    /// Human-readable identifier of where the resource lives
    async fn key(&self, info: &ResourceInfo) -> StorageResult<String>;
}
