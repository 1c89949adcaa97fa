//! Database schema definitions
//!
//! This module contains the SQL schema of the visited-page database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Pages that were fully processed
CREATE TABLE IF NOT EXISTS visited_pages (
    url TEXT PRIMARY KEY,
    visited_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visited_pages_visited_at ON visited_pages(visited_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
