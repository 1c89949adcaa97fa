//! Crawler module for page traversal and resource extraction
//!
//! This module contains the core scraping logic, including:
//! - HTTP page retrieval and downloads with retry logic
//! - Lazy depth-first graph search
//! - Link calculation against the visited-page history
//! - The download and text scraping services

mod downloads;
mod graph_search;
mod links;
mod pipeline;
mod retriever;
mod text;

#[cfg(test)]
pub(crate) mod testing;

pub use downloads::ScrapDownloadsService;
pub use graph_search::search;
pub use links::{link_calculator_for, DedupLinkCalculator, FullScanLinkCalculator, LinkCalculator};
pub use pipeline::{PageReport, ScrapSummary};
pub use retriever::{
    build_http_client, DownloadStreamProvider, HttpDownloader, HttpPageRetriever, PageRetriever,
    PAGE_CACHE_CAPACITY,
};
pub use text::ScrapTextService;

use crate::job::{Job, ResourceType};
use crate::storage::{resources_for, VisitedPageRepository};
use crate::Result;
use std::sync::Arc;

/// Runs a job over HTTP with the resource store its destination describes
///
/// Picks the download or text service from the job's resource type.
pub async fn run_job(job: &Job, visited: Arc<dyn VisitedPageRepository>) -> Result<ScrapSummary> {
    let retriever: Arc<dyn PageRetriever> = Arc::new(HttpPageRetriever::new(&job.http)?);
    let resources = resources_for(&job.destination)?;

    match job.resource_type {
        ResourceType::DownloadLink => {
            let downloads = Arc::new(HttpDownloader::new(&job.http)?);
            ScrapDownloadsService::new(retriever, visited, resources, downloads)
                .scrap(job)
                .await
        }
        ResourceType::Text => {
            ScrapTextService::new(retriever, visited, resources)
                .scrap(job)
                .await
        }
    }
}
