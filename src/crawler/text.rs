//! Scraping of page text

use crate::crawler::pipeline::{Extraction, PageReport, Pipeline, ScrapSummary};
use crate::crawler::retriever::PageRetriever;
use crate::job::Job;
use crate::storage::{ResourceRepository, VisitedPageRepository};
use crate::Result;
use futures::Stream;
use std::sync::Arc;

/// Stores the content a job's resource XPath selects
///
/// Every fragment is a resource whose URL is the page's own URL and whose
/// payload is the UTF-8 text. Only accepts jobs of type
/// [`ResourceType::Text`](crate::ResourceType).
#[derive(Clone)]
pub struct ScrapTextService {
    pipeline: Pipeline,
}

impl ScrapTextService {
    pub fn new(
        retriever: Arc<dyn PageRetriever>,
        visited: Arc<dyn VisitedPageRepository>,
        resources: Arc<dyn ResourceRepository>,
    ) -> Self {
        Self {
            pipeline: Pipeline::new(retriever, visited, resources, Extraction::Text),
        }
    }

    pub fn scrap_pages(&self, job: &Job) -> Result<impl Stream<Item = Result<PageReport>>> {
        self.pipeline.scrap_pages(job)
    }

    pub async fn scrap(&self, job: &Job) -> Result<ScrapSummary> {
        self.pipeline.scrap(job).await
    }
}
