//! Jobs and the resources they extract
//!
//! A [`Job`] is the immutable configuration of one crawl. It is built from a
//! persisted [`JobDefinition`] plus per-invocation [`JobOverrides`].

use crate::config::{compile_xpath, parse_root_url, DestinationConfig, HttpConfig, JobDefinition};
use crate::page::{Page, XPath};
use crate::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default number of attempts per page
pub const DEFAULT_PAGE_RETRIES: u32 = 5;

/// How the resource XPath is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    /// Matches are links to files that are downloaded
    DownloadLink,
    /// Matches are page content stored as text
    Text,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DownloadLink => "download-link",
            Self::Text => "text",
        })
    }
}

/// HTTP retry and caching policy of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPolicy {
    pub user_agent: String,
    pub retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub cache: bool,
}

impl From<&HttpConfig> for HttpPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            retries: config.retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
            cache: config.cache,
        }
    }
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

/// Per-invocation changes applied on top of a job definition
#[derive(Debug, Clone, Default)]
pub struct JobOverrides {
    pub root_url: Option<Url>,
    pub full_scan: bool,
    pub download_always: bool,
    pub disable_marking_visited: bool,
    pub disable_resource_writes: bool,
}

/// Immutable configuration of one crawl
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub root_url: Url,
    /// Links to follow; `None` makes this a single-page job
    pub adjacency_xpath: Option<XPath>,
    pub resource_xpath: XPath,
    pub resource_type: ResourceType,
    pub destination: DestinationConfig,
    pub http: HttpPolicy,
    /// Attempts per page before the crawl is aborted
    pub page_retries: u32,
    /// Ignore the visited-page history
    pub full_scan: bool,
    /// Ignore the resource existence check
    pub download_always: bool,
    pub disable_marking_visited: bool,
    pub disable_resource_writes: bool,
}

impl Job {
    /// Creates a job with default HTTP policy and flags
    pub fn new(
        name: impl Into<String>,
        root_url: Url,
        resource_type: ResourceType,
        resource_xpath: XPath,
        destination: DestinationConfig,
    ) -> Self {
        Self {
            name: name.into(),
            root_url,
            adjacency_xpath: None,
            resource_xpath,
            resource_type,
            destination,
            http: HttpPolicy::default(),
            page_retries: DEFAULT_PAGE_RETRIES,
            full_scan: false,
            download_always: false,
            disable_marking_visited: false,
            disable_resource_writes: false,
        }
    }

    pub fn with_adjacency(mut self, xpath: XPath) -> Self {
        self.adjacency_xpath = Some(xpath);
        self
    }

    pub fn with_overrides(mut self, overrides: &JobOverrides) -> Self {
        if let Some(root_url) = &overrides.root_url {
            self.root_url = root_url.clone();
        }
        self.full_scan |= overrides.full_scan;
        self.download_always |= overrides.download_always;
        self.disable_marking_visited |= overrides.disable_marking_visited;
        self.disable_resource_writes |= overrides.disable_resource_writes;
        self
    }

    /// Builds a job from its persisted definition
    ///
    /// # Errors
    ///
    /// Fails when no root URL is available, when the root URL (configured or
    /// overridden) is not http(s), or when an expression does not compile.
    pub fn from_definition(
        definition: &JobDefinition,
        http: &HttpConfig,
        overrides: &JobOverrides,
    ) -> Result<Self, ConfigError> {
        let root_url = match (&overrides.root_url, &definition.root_url) {
            (Some(url), _) => parse_root_url(url.as_str())?,
            (None, Some(url)) => parse_root_url(url)?,
            (None, None) => {
                return Err(ConfigError::Validation(format!(
                    "job '{}' has no root URL",
                    definition.name
                )))
            }
        };

        let adjacency_xpath = definition
            .adjacency_xpath
            .as_deref()
            .map(compile_xpath)
            .transpose()?;
        let resource_xpath = compile_xpath(&definition.resource_xpath)?;

        let mut policy = HttpPolicy::from(http);
        if let Some(retries) = definition.http_retries {
            policy.retries = retries;
        }
        if let Some(delay) = definition.http_retry_delay_ms {
            policy.retry_delay = Duration::from_millis(delay);
        }

        let job = Self {
            name: definition.name.clone(),
            root_url,
            adjacency_xpath,
            resource_xpath,
            resource_type: definition.resource_type,
            destination: definition.destination.clone(),
            http: policy,
            page_retries: definition.page_retries.unwrap_or(DEFAULT_PAGE_RETRIES).max(1),
            full_scan: definition.full_scan,
            download_always: definition.download_always,
            disable_marking_visited: false,
            disable_resource_writes: false,
        };

        Ok(job.with_overrides(&JobOverrides {
            root_url: None,
            ..overrides.clone()
        }))
    }
}

/// One extractable resource
///
/// The fingerprint is positional: moving a link on its page changes the
/// identity of the resource.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub page: Page,
    /// Position of the page in the traversal
    pub page_index: usize,
    pub url: Url,
    /// Position of the resource on its page
    pub index: usize,
}

impl ResourceInfo {
    pub fn new(page: Page, page_index: usize, url: Url, index: usize) -> Self {
        Self {
            page,
            page_index,
            url,
            index,
        }
    }

    pub fn fingerprint(&self) -> ResourceFingerprint {
        ResourceFingerprint {
            page_url: self.page.url().to_string(),
            resource_url: self.url.to_string(),
            index: self.index,
        }
    }
}

/// Identity of a resource across runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceFingerprint {
    pub page_url: String,
    pub resource_url: String,
    pub index: usize,
}
