//! File-system resource store
//!
//! Resources are written below a root folder at the path rendered by the
//! job's destination template.

use crate::config::DestinationConfig;
use crate::job::ResourceInfo;
use crate::storage::destination::PathTemplate;
use crate::storage::traits::{ContentStream, ResourceRepository, StorageResult};
use crate::ConfigError;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Writes resources as files
#[derive(Debug, Clone)]
pub struct FileSystemResources {
    root: PathBuf,
    template: PathTemplate,
}

impl FileSystemResources {
    pub fn new(root: impl Into<PathBuf>, template: PathTemplate) -> Self {
        Self {
            root: root.into(),
            template,
        }
    }

    /// Builds the store described by a destination configuration
    pub fn from_config(config: &DestinationConfig) -> Result<Self, ConfigError> {
        match config {
            DestinationConfig::FileSystem { root_folder, path } => {
                Ok(Self::new(root_folder, PathTemplate::parse(path)?))
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a resource
    pub fn path_of(&self, info: &ResourceInfo) -> StorageResult<PathBuf> {
        Ok(self.root.join(self.template.render(info)?))
    }
}

#[async_trait]
impl ResourceRepository for FileSystemResources {
    async fn exists(&self, info: &ResourceInfo) -> StorageResult<bool> {
        let path = self.path_of(info)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn upsert(&self, info: &ResourceInfo, mut content: ContentStream) -> StorageResult<()> {
        let path = self.path_of(info)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // The final name only appears once the whole payload is on disk
        let partial = partial_path(&path);
        match write_stream(&partial, &mut content).await {
            Ok(written) => {
                tokio::fs::rename(&partial, &path).await?;
                debug!("Wrote {} bytes to {}", written, path.display());
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!("Could not remove {}: {}", partial.display(), cleanup);
                }
                Err(e.into())
            }
        }
    }

    async fn key(&self, info: &ResourceInfo) -> StorageResult<String> {
        Ok(self.path_of(info)?.display().to_string())
    }
}

/// Copies the stream into a new file chunk by chunk
async fn write_stream(path: &Path, content: &mut ContentStream) -> std::io::Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = content.try_next().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
