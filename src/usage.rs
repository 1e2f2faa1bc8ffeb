// src/usage.rs

use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use std::path::Path;
use tracing::info;

/// Per-identity usage accounting with SQLite backend. The store is the only
/// writer of the counter; callers bill one increment per completed
/// extraction, never per upload attempt.
pub struct UsageStore {
    conn: Connection,
    max_uploads: u32,
}

impl UsageStore {
    pub fn new<P: AsRef<Path>>(db_path: P, max_uploads: u32) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS usage (
                identity TEXT PRIMARY KEY,
                upload_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        info!(max_uploads, "Usage store initialized");
        Ok(Self { conn, max_uploads })
    }

    pub fn max_uploads(&self) -> u32 {
        self.max_uploads
    }

    /// Identities are matched case-insensitively and ignore surrounding
    /// whitespace.
    fn normalize(identity: &str) -> String {
        identity.trim().to_lowercase()
    }

    /// Current consumed count; 0 for an unseen identity.
    pub fn get_usage(&self, identity: &str) -> SqliteResult<u32> {
        let count: Option<u32> = self
            .conn
            .query_row(
                "SELECT upload_count FROM usage WHERE identity = ?1",
                params![Self::normalize(identity)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    pub fn remaining(&self, identity: &str) -> SqliteResult<u32> {
        Ok(self.max_uploads.saturating_sub(self.get_usage(identity)?))
    }

    /// Add `by` to the identity's counter and return the new total.
    ///
    /// One atomic upsert-and-add: SQLite serializes the statement, so
    /// concurrent increments for the same identity cannot lose updates the
    /// way a read-then-write sequence would.
    pub fn increment(&self, identity: &str, by: u32) -> SqliteResult<u32> {
        let identity = Self::normalize(identity);
        let new_total: u32 = self.conn.query_row(
            "INSERT INTO usage (identity, upload_count)
             VALUES (?1, ?2)
             ON CONFLICT(identity) DO UPDATE SET
                upload_count = upload_count + excluded.upload_count,
                updated_at = CURRENT_TIMESTAMP
             RETURNING upload_count",
            params![identity, by],
            |row| row.get(0),
        )?;
        info!(identity = %identity, upload_count = new_total, "Usage incremented");
        Ok(new_total)
    }
}
