//! Fetched documents and XPath extraction
//!
//! A [`Page`] pairs the canonical URL of a document with its body. Link and
//! content extraction is done with compiled [`XPath`] expressions; links are
//! made absolute against the document URL (or its `<base href>`).

mod links;
mod xpath;

pub use xpath::{Target, XPath, XPathError, HTML_PREFIX};

use crate::crawler::PageRetriever;
use crate::ScrapError;
use scraper::{Html, Selector};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use url::Url;

/// One fetched HTML document
///
/// Two pages are equal when their URLs are equal, whatever their bodies hold.
/// A page reached through a redirect also remembers the URL it was requested
/// under.
#[derive(Clone)]
pub struct Page {
    url: Url,
    requested_url: Url,
    body: Arc<str>,
}

impl Page {
    /// Creates a page from its URL and HTML body
    ///
    /// The fragment of the URL is dropped so that `a#top` and `a` are the
    /// same page.
    pub fn new(mut url: Url, body: impl Into<Arc<str>>) -> Self {
        url.set_fragment(None);
        Self {
            requested_url: url.clone(),
            url,
            body: body.into(),
        }
    }

    /// Records the URL this page was requested under
    pub fn requested_as(mut self, mut url: Url) -> Self {
        url.set_fragment(None);
        self.requested_url = url;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// URL the page was requested under; differs from [`url`](Self::url)
    /// after a redirect
    pub fn requested_url(&self) -> &Url {
        &self.requested_url
    }

    /// Returns true when the page was served from another URL than requested
    pub fn is_redirected(&self) -> bool {
        self.requested_url != self.url
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Scheme and host of the page URL
    pub fn origin(&self) -> Url {
        let mut origin = self.url.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        origin
    }

    fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }

    /// URL relative links are resolved against
    fn base_url(&self, document: &Html) -> Url {
        Selector::parse("base[href]")
            .ok()
            .and_then(|selector| {
                document
                    .select(&selector)
                    .next()
                    .and_then(|base| base.value().attr("href"))
                    .and_then(|href| self.url.join(href.trim()).ok())
            })
            .unwrap_or_else(|| self.url.clone())
    }

    /// Returns absolute URLs for every match, in document order
    ///
    /// Empty hrefs and non-navigable schemes (`javascript:`, `mailto:`, ...)
    /// are dropped.
    pub fn links(&self, xpath: &XPath) -> Vec<Url> {
        let document = self.document();
        let base = self.base_url(&document);

        xpath
            .hrefs(&document)
            .iter()
            .filter_map(|href| links::resolve_link(href, &base))
            .collect()
    }

    /// Returns the first link matched by the expression
    pub fn link(&self, xpath: &XPath) -> Option<Url> {
        self.links(xpath).into_iter().next()
    }

    /// Returns the content of every match, in document order
    pub fn contents(&self, xpath: &XPath) -> Vec<String> {
        xpath.contents(&self.document())
    }

    /// Returns the first content matched by the expression
    pub fn content(&self, xpath: &XPath) -> Result<String, ScrapError> {
        self.content_or_none(xpath)
            .ok_or_else(|| ScrapError::MissingContent {
                url: self.url.to_string(),
                xpath: xpath.to_string(),
            })
    }

    pub fn content_or_none(&self, xpath: &XPath) -> Option<String> {
        self.contents(xpath).into_iter().next()
    }

    /// Follows the first link matched by the expression and fetches it
    ///
    /// Returns `Ok(None)` when nothing matches.
    pub async fn linked_doc(
        &self,
        xpath: &XPath,
        retriever: &dyn PageRetriever,
    ) -> Result<Option<Page>, ScrapError> {
        match self.link(xpath) {
            Some(url) => Ok(Some(retriever.get_page(&url).await?)),
            None => Ok(None),
        }
    }

    /// Fetches this page again, bypassing any response cache
    ///
    /// The reloaded page keeps the URL this page was first requested under.
    pub async fn reload(&self, retriever: &dyn PageRetriever) -> Result<Page, ScrapError> {
        let fresh = retriever.reload(self).await?;
        Ok(fresh.requested_as(self.requested_url.clone()))
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Page {}

impl Hash for Page {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

impl Borrow<Url> for Page {
    fn borrow(&self) -> &Url {
        &self.url
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("url", &self.url.as_str())
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
