//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the visited-page
//! repository.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, VisitedPageRepository};
use crate::storage::{UrlPattern, VisitedPageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// SQLite visited-page store
pub struct SqliteVisitedPages {
    conn: Mutex<Connection>,
}

impl SqliteVisitedPages {
    /// Opens or creates the database at the given path
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteVisitedPages)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::with_connection(conn)
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        // URL patterns are case-sensitive
        conn.execute_batch("PRAGMA case_sensitive_like = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }
}

#[async_trait]
impl VisitedPageRepository for SqliteVisitedPages {
    async fn exists(&self, url: &Url) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM visited_pages WHERE url = ?1",
                params![url.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn upsert(&self, url: &Url) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO visited_pages (url, visited_at) VALUES (?1, ?2)
             ON CONFLICT(url) DO UPDATE SET visited_at = excluded.visited_at",
            params![url.as_str(), now],
        )?;
        Ok(())
    }

    async fn search(&self, pattern: &UrlPattern) -> StorageResult<Vec<VisitedPageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT url, visited_at FROM visited_pages
             WHERE url LIKE ?1 ESCAPE '\\' ORDER BY url",
        )?;

        let records = stmt
            .query_map(params![pattern.to_sql_like()], |row| {
                let visited_at: String = row.get(1)?;
                Ok(VisitedPageRecord {
                    url: row.get(0)?,
                    visited_at: visited_at.parse::<DateTime<Utc>>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                    })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    async fn delete(&self, pattern: &UrlPattern) -> StorageResult<u64> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM visited_pages WHERE url LIKE ?1 ESCAPE '\\'",
            params![pattern.to_sql_like()],
        )?;
        Ok(removed as u64)
    }
}
