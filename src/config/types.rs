use crate::job::ResourceType;
use serde::Deserialize;

/// Main configuration structure for xscrape
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    pub storage: StorageConfig,
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobDefinition>,
}

impl Config {
    /// Looks up a job definition by name
    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// HTTP policy shared by every job unless a job overrides it
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Number of retries after a failed request
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Fixed delay between retries (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Keep fetched pages in memory for the duration of a run
    #[serde(default)]
    pub cache: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
            cache: false,
        }
    }
}

fn default_user_agent() -> String {
    format!("xscrape/{}", env!("CARGO_PKG_VERSION"))
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

/// Visited-page store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding visited pages
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A persisted job definition
#[derive(Debug, Clone, Deserialize)]
pub struct JobDefinition {
    /// Name used to select the job on the command line
    pub name: String,

    /// Page the crawl starts from (may be supplied on the command line instead)
    #[serde(rename = "root-url")]
    pub root_url: Option<String>,

    /// Links to follow; absent for single-page jobs
    #[serde(rename = "adjacency-xpath")]
    pub adjacency_xpath: Option<String>,

    /// Links or content to capture
    #[serde(rename = "resource-xpath")]
    pub resource_xpath: String,

    #[serde(rename = "resource-type")]
    pub resource_type: ResourceType,

    /// Attempts per page before the crawl is aborted
    #[serde(rename = "page-retries")]
    pub page_retries: Option<u32>,

    #[serde(rename = "http-retries")]
    pub http_retries: Option<u32>,

    #[serde(rename = "http-retry-delay-ms")]
    pub http_retry_delay_ms: Option<u64>,

    #[serde(rename = "full-scan", default)]
    pub full_scan: bool,

    #[serde(rename = "download-always", default)]
    pub download_always: bool,

    pub destination: DestinationConfig,
}

/// Where resources are written
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DestinationConfig {
    /// Files below a root folder, named by a path template
    FileSystem {
        #[serde(rename = "root-folder")]
        root_folder: String,
        path: String,
    },
}
