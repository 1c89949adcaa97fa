use crate::config::types::{Config, DestinationConfig, HttpConfig, JobDefinition, StorageConfig};
use crate::page::XPath;
use crate::storage::PathTemplate;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_http_config(&config.http)?;
    validate_storage_config(&config.storage)?;
    validate_jobs(&config.jobs)?;
    Ok(())
}

/// Validates the HTTP policy
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates job definitions
fn validate_jobs(jobs: &[JobDefinition]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for job in jobs {
        if job.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "job name cannot be empty".to_string(),
            ));
        }

        if !names.insert(job.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "job '{}' is defined more than once",
                job.name
            )));
        }

        if let Some(root_url) = &job.root_url {
            parse_root_url(root_url)?;
        }

        if let Some(adjacency) = &job.adjacency_xpath {
            compile_xpath(adjacency)?;
        }
        compile_xpath(&job.resource_xpath)?;

        if job.page_retries == Some(0) {
            return Err(ConfigError::Validation(format!(
                "job '{}': page-retries must be >= 1",
                job.name
            )));
        }

        validate_destination(&job.destination)?;
    }

    Ok(())
}

/// Parses a root URL, which must be absolute HTTP(S)
pub(crate) fn parse_root_url(root_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(root_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid root URL '{}': {}", root_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Root URL '{}' must use the HTTP or HTTPS scheme",
            root_url
        )));
    }

    Ok(url)
}

/// Compiles an XPath expression from the configuration
pub(crate) fn compile_xpath(expression: &str) -> Result<XPath, ConfigError> {
    XPath::parse(expression).map_err(|e| ConfigError::InvalidXPath(e.to_string()))
}

/// Validates a destination configuration
fn validate_destination(destination: &DestinationConfig) -> Result<(), ConfigError> {
    match destination {
        DestinationConfig::FileSystem { root_folder, path } => {
            if root_folder.is_empty() {
                return Err(ConfigError::Validation(
                    "root-folder cannot be empty".to_string(),
                ));
            }
            PathTemplate::parse(path)?;
        }
    }

    Ok(())
}
