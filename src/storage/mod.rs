//! The two tiers a note lives in.
//!
//! [`NoteCache`] is a plain string key-value slot store, written wholesale on
//! every save. [`RemoteNoteStore`] is the best-effort server mirror.

pub mod http;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use crate::notes::{NoteKey, RemoteNote};

pub use http::{HttpNoteStore, HttpUploadService};
pub use memory::{MemoryNoteCache, MemoryRemoteStore};

#[async_trait]
pub trait NoteCache: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>>;
    async fn write(&self, key: &str, value: &str) -> Result<()>;
    /// Deletes the slot. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait RemoteNoteStore: Send + Sync {
    /// `Ok(None)` means the server has no record for `key`.
    async fn fetch(&self, key: &NoteKey) -> Result<Option<RemoteNote>>;
    /// Replaces the whole record.
    async fn store(&self, key: &NoteKey, note: &RemoteNote) -> Result<()>;
}

/// Remote stand-in when no server is configured: nothing to fetch, every
/// write is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnly;

#[async_trait]
impl RemoteNoteStore for LocalOnly {
    async fn fetch(&self, _key: &NoteKey) -> Result<Option<RemoteNote>> {
        Ok(None)
    }

    async fn store(&self, key: &NoteKey, _note: &RemoteNote) -> Result<()> {
        debug!("no remote configured; keeping {key} local only");
        Ok(())
    }
}
