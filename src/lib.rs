//! xscrape: a configuration-driven web scraper
//!
//! This crate crawls pages reachable from a root URL by following the links an
//! adjacency XPath selects, and stores the resources a resource XPath selects
//! (downloadable files or inline text) through a pluggable repository. Pages
//! that were already processed are remembered across runs.

pub mod config;
pub mod crawler;
pub mod job;
pub mod page;
pub mod storage;

use thiserror::Error;

/// Main error type for xscrape operations
#[derive(Debug, Error)]
pub enum ScrapError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("XPath error: {0}")]
    XPath(#[from] page::XPathError),

    #[error("No content matched {xpath} on {url}")]
    MissingContent { url: String, xpath: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Job '{job}' has resource type {actual}, but this pipeline handles {expected}")]
    ResourceTypeMismatch {
        job: String,
        expected: job::ResourceType,
        actual: job::ResourceType,
    },

    #[error("Giving up on {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<ScrapError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapError {
    /// Returns true if the failure may go away when the page is fetched again
    ///
    /// Configuration and contract violations are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. }
            | Self::HttpStatus { .. }
            | Self::Reqwest(_)
            | Self::MissingContent { .. }
            | Self::Storage(_)
            | Self::Io(_) => true,
            Self::Config(_)
            | Self::UrlParse(_)
            | Self::XPath(_)
            | Self::ResourceTypeMismatch { .. }
            | Self::RetriesExhausted { .. } => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid XPath in config: {0}")]
    InvalidXPath(String),

    #[error("Invalid destination template: {0}")]
    InvalidTemplate(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),
}

/// Result type alias for xscrape operations
pub type Result<T> = std::result::Result<T, ScrapError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use job::{Job, ResourceInfo, ResourceType};
pub use page::{Page, XPath};
