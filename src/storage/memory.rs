use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::notes::{NoteKey, RemoteNote};

use super::{NoteCache, RemoteNoteStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local cache, the equivalent of a browser's session storage.
#[derive(Debug, Default)]
pub struct MemoryNoteCache {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryNoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn entry(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.entries).insert(key.into(), value.into());
    }
}

#[async_trait]
impl NoteCache for MemoryNoteCache {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entry(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("local storage quota exceeded");
        }
        self.insert(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// In-process remote with optional per-note latency and failure injection.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    records: Mutex<HashMap<NoteKey, RemoteNote>>,
    latency: Mutex<HashMap<NoteKey, Duration>>,
    fetches: AtomicUsize,
    stores: AtomicUsize,
    fail_stores: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &NoteKey, note: RemoteNote) {
        lock(&self.records).insert(key.clone(), note);
    }

    pub fn record(&self, key: &NoteKey) -> Option<RemoteNote> {
        lock(&self.records).get(key).cloned()
    }

    /// Delays every fetch and store for `key`.
    pub fn set_latency(&self, key: &NoteKey, delay: Duration) {
        lock(&self.latency).insert(key.clone(), delay);
    }

    pub fn set_fail_stores(&self, fail: bool) {
        self.fail_stores.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of store attempts, failed ones included.
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self, key: &NoteKey) {
        let delay = lock(&self.latency).get(key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteNoteStore for MemoryRemoteStore {
    async fn fetch(&self, key: &NoteKey) -> Result<Option<RemoteNote>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency(key).await;
        Ok(self.record(key))
    }

    async fn store(&self, key: &NoteKey, note: &RemoteNote) -> Result<()> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency(key).await;
        if self.fail_stores.load(Ordering::SeqCst) {
            bail!("remote unavailable");
        }
        self.insert(key, note.clone());
        Ok(())
    }
}
