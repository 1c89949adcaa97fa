//! Adjacent pages worth visiting

use crate::job::Job;
use crate::page::{Page, XPath};
use crate::storage::VisitedPageRepository;
use crate::{Result, ScrapError};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Computes the links of a page the traversal should follow
pub trait LinkCalculator: Send + Sync {
    /// Yields absolute link URLs in document order
    ///
    /// A page without an adjacency expression has no links.
    fn calculate_links(
        &self,
        page: &Page,
        adjacency: Option<&XPath>,
    ) -> BoxStream<'static, Result<Url>>;
}

/// Skips links that the visited-page history already holds
pub struct DedupLinkCalculator {
    visited: Arc<dyn VisitedPageRepository>,
}

impl DedupLinkCalculator {
    pub fn new(visited: Arc<dyn VisitedPageRepository>) -> Self {
        Self { visited }
    }
}

impl LinkCalculator for DedupLinkCalculator {
    fn calculate_links(
        &self,
        page: &Page,
        adjacency: Option<&XPath>,
    ) -> BoxStream<'static, Result<Url>> {
        let Some(xpath) = adjacency else {
            return stream::empty().boxed();
        };

        let links = page.links(xpath);
        let visited = self.visited.clone();

        Box::pin(async_stream::try_stream! {
            for link in links {
                if visited.exists(&link).await.map_err(ScrapError::from)? {
                    debug!("Skipping visited page {}", link);
                    continue;
                }
                yield link;
            }
        })
    }
}

/// Follows every link, ignoring the visited-page history
#[derive(Debug, Default)]
pub struct FullScanLinkCalculator;

impl LinkCalculator for FullScanLinkCalculator {
    fn calculate_links(
        &self,
        page: &Page,
        adjacency: Option<&XPath>,
    ) -> BoxStream<'static, Result<Url>> {
        match adjacency {
            Some(xpath) => stream::iter(page.links(xpath).into_iter().map(Ok)).boxed(),
            None => stream::empty().boxed(),
        }
    }
}

/// Picks the calculator matching the job's scan mode
pub fn link_calculator_for(
    job: &Job,
    visited: Arc<dyn VisitedPageRepository>,
) -> Arc<dyn LinkCalculator> {
    if job.full_scan {
        Arc::new(FullScanLinkCalculator)
    } else {
        Arc::new(DedupLinkCalculator::new(visited))
    }
}
