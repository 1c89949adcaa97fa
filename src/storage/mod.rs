//! Storage for crawl state and extracted resources
//!
//! This module handles everything that outlives a page step:
//! - the visited-page history (SQLite or in memory)
//! - resource stores (file system or in memory)
//! - destination path templates
//! - URL patterns for history maintenance

mod destination;
mod filesystem;
mod memory;
mod pattern;
mod schema;
mod sqlite;
mod traits;

pub use destination::PathTemplate;
pub use filesystem::FileSystemResources;
pub use memory::{MemoryResources, MemoryVisitedPages};
pub use pattern::UrlPattern;
pub use sqlite::SqliteVisitedPages;
pub use traits::{
    content_from, ContentStream, ResourceRepository, StorageError, StorageResult,
    VisitedPageRepository,
};

use crate::config::DestinationConfig;
use crate::ConfigError;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// Opens or creates the visited-page database
pub fn open_visited_pages(path: &Path) -> StorageResult<SqliteVisitedPages> {
    SqliteVisitedPages::new(path)
}

/// Builds the resource store a destination configuration describes
pub fn resources_for(
    destination: &DestinationConfig,
) -> Result<Arc<dyn ResourceRepository>, ConfigError> {
    match destination {
        DestinationConfig::FileSystem { .. } => {
            Ok(Arc::new(FileSystemResources::from_config(destination)?))
        }
    }
}

/// A page recorded as visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitedPageRecord {
    pub url: String,
    pub visited_at: DateTime<Utc>,
}
