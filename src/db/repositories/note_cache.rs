use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::db::{
    connection::Database,
    helpers::{escape_like, parse_datetime},
};
use crate::storage::NoteCache;

/// One slot of the local note cache.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

fn row_to_entry(row: &Row) -> Result<CacheEntry> {
    let updated_at: String = row.get("updated_at")?;
    Ok(CacheEntry {
        key: row.get("key")?,
        value: row.get("value")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn get_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, updated_at
                 FROM note_cache
                 WHERE key = ?1",
            )?;
            let mut rows = stmt.query(params![key])?;
            let entry = match rows.next()? {
                Some(row) => Some(row_to_entry(row)?),
                None => None,
            };
            Ok(entry)
        })
        .await
    }

    /// Inserts or overwrites the slot wholesale.
    pub async fn put_cache_entry(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO note_cache (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write note cache entry {key}"))?;
            Ok(())
        })
        .await
    }

    /// Returns whether a row was deleted.
    pub async fn delete_cache_entry(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM note_cache WHERE key = ?1", params![key])
                .with_context(|| format!("failed to delete note cache entry {key}"))?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Entries whose key starts with `prefix`, most recently written first.
    pub async fn list_cache_entries(&self, prefix: &str) -> Result<Vec<CacheEntry>> {
        let pattern = format!("{}%", escape_like(prefix));
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, updated_at
                 FROM note_cache
                 WHERE key LIKE ?1 ESCAPE '\\'
                 ORDER BY updated_at DESC",
            )?;

            let mut rows = stmt.query(params![pattern])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }
            Ok(entries)
        })
        .await
    }

    pub async fn cache_entry_exists(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.execute(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM note_cache WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }
}

#[async_trait]
impl NoteCache for Database {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_cache_entry(key).await?.map(|entry| entry.value))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.put_cache_entry(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.delete_cache_entry(key).await.map(|_| ())
    }
}
