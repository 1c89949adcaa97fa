//! Crawl-and-extract skeleton shared by the download and text services
//!
//! Pages come from a depth-first [`search`](super::graph_search::search)
//! starting at the job's root URL. Each page goes through one page step:
//!
//! 1. extract the resources of the page
//! 2. skip resources the repository already holds (unless `download_always`)
//! 3. stream the payload into the repository
//! 4. mark the page visited, under its requested URL too when it was
//!    redirected
//!
//! A failing step reloads the page and runs again from scratch until the
//! job's page retry budget is spent.

use crate::crawler::graph_search::search;
use crate::crawler::links::link_calculator_for;
use crate::crawler::retriever::{DownloadStreamProvider, PageRetriever};
use crate::job::{Job, ResourceInfo, ResourceType};
use crate::page::Page;
use crate::storage::{content_from, ContentStream, ResourceRepository, VisitedPageRepository};
use crate::{Result, ScrapError};
use futures::{Stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of one page step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub url: Url,
    /// Position of the page in the traversal
    pub page_index: usize,
    /// Attempts the page step needed
    pub attempts: u32,
    pub written: usize,
    /// Resources that already existed
    pub skipped: usize,
    /// Resources left unwritten because writes are disabled
    pub suppressed: usize,
}

/// Totals of a finished crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapSummary {
    pub pages: usize,
    pub written: usize,
    pub skipped: usize,
    pub suppressed: usize,
}

impl ScrapSummary {
    fn record(&mut self, report: &PageReport) {
        self.pages += 1;
        self.written += report.written;
        self.skipped += report.skipped;
        self.suppressed += report.suppressed;
    }
}

/// Where resource payloads come from
#[derive(Clone)]
pub(crate) enum Extraction {
    /// Resource XPath selects links whose targets are downloaded
    Downloads(Arc<dyn DownloadStreamProvider>),
    /// Resource XPath selects page content stored as UTF-8 text
    Text,
}

impl Extraction {
    fn resource_type(&self) -> ResourceType {
        match self {
            Self::Downloads(_) => ResourceType::DownloadLink,
            Self::Text => ResourceType::Text,
        }
    }

    fn extract(&self, job: &Job, page: &Page, page_index: usize) -> Vec<Extracted> {
        match self {
            Self::Downloads(provider) => page
                .links(&job.resource_xpath)
                .into_iter()
                .enumerate()
                .map(|(index, url)| Extracted {
                    info: ResourceInfo::new(page.clone(), page_index, url, index),
                    source: Source::Download(provider.clone()),
                })
                .collect(),
            Self::Text => page
                .contents(&job.resource_xpath)
                .into_iter()
                .enumerate()
                .map(|(index, text)| Extracted {
                    info: ResourceInfo::new(page.clone(), page_index, page.url().clone(), index),
                    source: Source::Inline(text),
                })
                .collect(),
        }
    }
}

/// Where the payload of one resource comes from
enum Source {
    Download(Arc<dyn DownloadStreamProvider>),
    Inline(String),
}

struct Extracted {
    info: ResourceInfo,
    source: Source,
}

impl Extracted {
    async fn content(&self) -> Result<ContentStream> {
        match &self.source {
            Source::Download(provider) => provider.get_stream(&self.info.url).await,
            Source::Inline(text) => Ok(content_from(text.clone())),
        }
    }
}

/// Shared state of one scraping service
#[derive(Clone)]
pub(crate) struct Pipeline {
    retriever: Arc<dyn PageRetriever>,
    visited: Arc<dyn VisitedPageRepository>,
    resources: Arc<dyn ResourceRepository>,
    extraction: Extraction,
}

impl Pipeline {
    pub(crate) fn new(
        retriever: Arc<dyn PageRetriever>,
        visited: Arc<dyn VisitedPageRepository>,
        resources: Arc<dyn ResourceRepository>,
        extraction: Extraction,
    ) -> Self {
        Self {
            retriever,
            visited,
            resources,
            extraction,
        }
    }

    /// Fails when the job was written for the other service
    pub(crate) fn check_resource_type(&self, job: &Job) -> Result<()> {
        let expected = self.extraction.resource_type();
        if job.resource_type != expected {
            return Err(ScrapError::ResourceTypeMismatch {
                job: job.name.clone(),
                expected,
                actual: job.resource_type,
            });
        }
        Ok(())
    }

    /// Lazily crawls the job, one report per page in traversal order
    ///
    /// The first error ends the stream.
    pub(crate) fn scrap_pages(&self, job: &Job) -> Result<impl Stream<Item = Result<PageReport>>> {
        self.check_resource_type(job)?;

        let job = Arc::new(job.clone());
        let calculator = link_calculator_for(&job, self.visited.clone());
        let retriever = self.retriever.clone();
        let adjacency = job.adjacency_xpath.clone();

        info!("Starting job '{}' at {}", job.name, job.root_url);

        let pages = search(
            job.root_url.clone(),
            move |url: Url| {
                let retriever = retriever.clone();
                async move { retriever.get_page(&url).await }
            },
            move |page: Page| calculator.calculate_links(&page, adjacency.as_ref()),
        );

        let pipeline = self.clone();
        let reports = pages
            .enumerate()
            .then(move |(page_index, page)| {
                let pipeline = pipeline.clone();
                let job = job.clone();
                async move { pipeline.process_page_with_retry(&job, page?, page_index).await }
            });

        Ok(stop_after_error(reports))
    }

    /// Crawls the whole job and adds up the page reports
    pub(crate) async fn scrap(&self, job: &Job) -> Result<ScrapSummary> {
        let reports = self.scrap_pages(job)?;
        futures::pin_mut!(reports);

        let mut summary = ScrapSummary::default();
        while let Some(report) = reports.try_next().await? {
            summary.record(&report);
        }

        info!(
            "Job '{}' finished: {} pages, {} resources written, {} skipped",
            job.name, summary.pages, summary.written, summary.skipped
        );
        Ok(summary)
    }

    async fn process_page_with_retry(&self, job: &Job, page: Page, page_index: usize) -> Result<PageReport> {
        let budget = job.page_retries.max(1);
        let mut page = page;
        let mut attempt = 1;

        loop {
            let outcome = if attempt == 1 {
                self.process_page(job, &page, page_index).await
            } else {
                match page.reload(self.retriever.as_ref()).await {
                    Ok(fresh) => {
                        page = fresh;
                        self.process_page(job, &page, page_index).await
                    }
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok(mut report) => {
                    report.attempts = attempt;
                    return Ok(report);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= budget => {
                    return Err(ScrapError::RetriesExhausted {
                        url: page.url().to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    })
                }
                Err(e) => {
                    warn!(
                        "Page {} failed on attempt {}/{}: {}; reloading",
                        page.url(),
                        attempt,
                        budget,
                        e
                    );
                    attempt += 1;
                }
            }
        }
    }

    async fn process_page(&self, job: &Job, page: &Page, page_index: usize) -> Result<PageReport> {
        info!("Scraping page #{} {}", page_index, page.url());

        let mut report = PageReport {
            url: page.url().clone(),
            page_index,
            attempts: 1,
            written: 0,
            skipped: 0,
            suppressed: 0,
        };

        for resource in self.extraction.extract(job, page, page_index) {
            if !job.download_always && self.resources.exists(&resource.info).await? {
                debug!(
                    "Skipping existing resource {}",
                    self.resources.key(&resource.info).await?
                );
                report.skipped += 1;
                continue;
            }

            let key = self.resources.key(&resource.info).await?;
            if job.disable_resource_writes {
                info!("Would write {}", key);
                report.suppressed += 1;
                continue;
            }

            let content = resource.content().await?;
            self.resources.upsert(&resource.info, content).await?;
            info!("Wrote {}", key);
            report.written += 1;
        }

        if !job.disable_marking_visited {
            self.visited.upsert(page.url()).await?;
            if page.is_redirected() {
                self.visited.upsert(page.requested_url()).await?;
            }
        }

        Ok(report)
    }
}

/// Ends a result stream right after its first error
fn stop_after_error<T>(
    stream: impl Stream<Item = Result<T>>,
) -> impl Stream<Item = Result<T>> {
    stream
        .scan(false, |failed, item| {
            let next = if *failed {
                None
            } else {
                *failed = item.is_err();
                Some(item)
            };
            futures::future::ready(next)
        })
}
