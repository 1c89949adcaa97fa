//! Scraping of downloadable resources

use crate::crawler::pipeline::{Extraction, PageReport, Pipeline, ScrapSummary};
use crate::crawler::retriever::{DownloadStreamProvider, PageRetriever};
use crate::job::Job;
use crate::storage::{ResourceRepository, VisitedPageRepository};
use crate::Result;
use futures::Stream;
use std::sync::Arc;

/// Downloads the files a job's resource XPath links to
///
/// Only accepts jobs of type [`ResourceType::DownloadLink`](crate::ResourceType).
#[derive(Clone)]
pub struct ScrapDownloadsService {
    pipeline: Pipeline,
}

impl ScrapDownloadsService {
    pub fn new(
        retriever: Arc<dyn PageRetriever>,
        visited: Arc<dyn VisitedPageRepository>,
        resources: Arc<dyn ResourceRepository>,
        downloads: Arc<dyn DownloadStreamProvider>,
    ) -> Self {
        Self {
            pipeline: Pipeline::new(retriever, visited, resources, Extraction::Downloads(downloads)),
        }
    }

    /// Crawls the job lazily, one report per page
    ///
    /// # Errors
    ///
    /// Fails before any request when the job is not a download job.
    pub fn scrap_pages(&self, job: &Job) -> Result<impl Stream<Item = Result<PageReport>>> {
        self.pipeline.scrap_pages(job)
    }

    /// Crawls the whole job
    pub async fn scrap(&self, job: &Job) -> Result<ScrapSummary> {
        self.pipeline.scrap(job).await
    }
}
