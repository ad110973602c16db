use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    settings::SyncSettings,
    storage::{NoteCache, RemoteNoteStore},
};

use super::{
    reconcile::{document_from_remote, reconcile, Decision},
    CachedNote, Document, LoadStatus, NoteEvent, NoteKey, NoteSnapshot, Notice, RemoteNote,
    SaveStatus,
};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingSync {
    note: RemoteNote,
    /// Came from an explicit save, so a failed push is worth telling the user.
    announce: bool,
}

/// Everything tied to the note currently being edited. Replaced wholesale when
/// the user or question changes; tasks compare `id` before touching it.
struct DocumentSession {
    id: Uuid,
    key: NoteKey,
    document: Document,
    /// Sanitized form of what the local cache holds.
    last_saved: Option<Document>,
    last_saved_at: Option<DateTime<Utc>>,
    status: SaveStatus,
    load: LoadStatus,
    fetch_cancel: CancellationToken,
    fetch_task: Option<JoinHandle<()>>,
    autosave_task: Option<JoinHandle<()>>,
    remote_task: Option<JoinHandle<()>>,
    pending_remote: Option<PendingSync>,
}

impl DocumentSession {
    fn new(key: NoteKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            document: Document::default(),
            last_saved: None,
            last_saved_at: None,
            status: SaveStatus::Idle,
            load: LoadStatus::Idle,
            fetch_cancel: CancellationToken::new(),
            fetch_task: None,
            autosave_task: None,
            remote_task: None,
            pending_remote: None,
        }
    }

    fn has_changes(&self) -> bool {
        let current = self.document.sanitized();
        match &self.last_saved {
            Some(saved) => *saved != current,
            None => !current.is_empty(),
        }
    }

    fn cancel_timers(&mut self) {
        if let Some(handle) = self.autosave_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.remote_task.take() {
            handle.abort();
        }
    }

    fn teardown(&mut self) {
        self.fetch_cancel.cancel();
        self.cancel_timers();
    }

    fn snapshot(&self) -> NoteSnapshot {
        NoteSnapshot {
            key: Some(self.key.clone()),
            document: self.document.clone(),
            status: self.status,
            load: self.load,
            last_saved_at: self.last_saved_at,
            has_changes: self.has_changes(),
        }
    }
}

fn current(slot: &mut Option<DocumentSession>, id: Uuid) -> Option<&mut DocumentSession> {
    slot.as_mut().filter(|session| session.id == id)
}

/// Keeps one note in sync across the local cache and the remote store.
///
/// Edits go through [`autosave`](Self::autosave), which debounces a silent
/// local write; every successful local write (re)arms a longer debounce that
/// mirrors the note to the remote store. Opening a note shows the cached copy
/// at once and lets the remote copy replace it when the two disagree.
#[derive(Clone)]
pub struct NoteSyncManager {
    cache: Arc<dyn NoteCache>,
    remote: Arc<dyn RemoteNoteStore>,
    session: Arc<Mutex<Option<DocumentSession>>>,
    /// Serializes cache writes so a remote apply cannot interleave with a save.
    save_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<NoteEvent>,
    autosave_delay: Duration,
    remote_sync_delay: Duration,
}

impl NoteSyncManager {
    pub fn new(
        cache: Arc<dyn NoteCache>,
        remote: Arc<dyn RemoteNoteStore>,
        settings: &SyncSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cache,
            remote,
            session: Arc::new(Mutex::new(None)),
            save_lock: Arc::new(Mutex::new(())),
            events,
            autosave_delay: settings.autosave_delay(),
            remote_sync_delay: settings.remote_sync_delay(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> NoteSnapshot {
        let slot = self.session.lock().await;
        slot.as_ref()
            .map(DocumentSession::snapshot)
            .unwrap_or_default()
    }

    /// Opens the note for `(user_id, question_id)`.
    ///
    /// Returns the locally cached document (legacy tokens migrated) or an
    /// empty one. The remote copy is fetched in the background; use
    /// [`wait_for_remote`](Self::wait_for_remote) to await it.
    pub async fn hydrate(&self, user_id: &str, question_id: &str) -> Result<Document> {
        let key = NoteKey::new(user_id, question_id);
        let session_id = {
            let mut slot = self.session.lock().await;
            if let Some(mut previous) = slot.take() {
                self.retire(&mut previous);
            }
            let mut session = DocumentSession::new(key.clone());
            if key.has_user() {
                session.load = LoadStatus::Loading;
            }
            let id = session.id;
            *slot = Some(session);
            id
        };

        if !key.has_user() {
            log_info!(
                "No signed-in user; notes for question {} start empty",
                key.question_id
            );
            return Ok(Document::default());
        }

        self.emit(NoteEvent::LoadChanged {
            key: key.clone(),
            load: LoadStatus::Loading,
        });

        let cached = match self.read_cached(&key).await {
            Ok(cached) => cached,
            Err(err) => {
                log_error!("Failed to read local notes for {key}: {err:#}");
                None
            }
        };

        let mut slot = self.session.lock().await;
        let Some(session) = current(&mut slot, session_id) else {
            log_debug!("Hydration of {key} superseded before the cache was read");
            return Ok(Document::default());
        };

        if let Some(cached) = cached {
            let saved = cached.to_document();
            let mut document = saved.clone();
            if document.migrate_legacy() {
                log_info!("Migrated legacy image tokens in {key}");
            }
            session.document = document;
            session.last_saved = Some(saved);
            session.last_saved_at = Some(cached.last_saved_at);
            log_debug!("Hydrated {key} from local cache");
        }

        let document = session.document.clone();
        let token = session.fetch_cancel.clone();
        session.fetch_task = Some(tokio::spawn(
            self.clone().apply_remote(session_id, key, token),
        ));
        Ok(document)
    }

    /// Resolves once the background fetch started by the last hydrate settles.
    pub async fn wait_for_remote(&self) {
        let handle = {
            let mut slot = self.session.lock().await;
            slot.as_mut().and_then(|session| session.fetch_task.take())
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Explicit save: writes the sanitized document to the local cache now and
    /// schedules the remote mirror. Notices are emitted unless `silent`.
    pub async fn save(&self, document: Document, silent: bool) -> Result<()> {
        let session_id = {
            let mut slot = self.session.lock().await;
            let session = slot.as_mut().ok_or_else(|| anyhow!("no note is open"))?;
            session.document = document.clone();
            if let Some(handle) = session.autosave_task.take() {
                handle.abort();
            }
            session.id
        };
        self.persist(session_id, document, silent).await
    }

    /// Records an edit and (re)arms the autosave debounce.
    pub async fn autosave(&self, document: Document) {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.as_mut() else {
            log_debug!("Edit ignored: no note is open");
            return;
        };

        session.document = document;
        if session.status == SaveStatus::Saved {
            session.status = SaveStatus::Idle;
            self.emit(NoteEvent::StatusChanged {
                key: session.key.clone(),
                status: SaveStatus::Idle,
            });
        }

        // A fresh edit postpones the remote mirror too; its payload stays pending.
        session.cancel_timers();

        if session.load == LoadStatus::Loading || !session.key.has_user() {
            return;
        }
        self.arm_autosave(session);
    }

    /// Drops the note locally and asks the remote store to forget it.
    pub async fn clear(&self) -> Result<()> {
        let _saving = self.save_lock.lock().await;
        let (session_id, key) = {
            let mut slot = self.session.lock().await;
            let session = slot.as_mut().ok_or_else(|| anyhow!("no note is open"))?;
            session.teardown();
            session.pending_remote = None;
            session.document = Document::default();
            session.last_saved = None;
            session.last_saved_at = None;
            session.status = SaveStatus::Idle;
            session.load = LoadStatus::Idle;
            self.emit(NoteEvent::StatusChanged {
                key: session.key.clone(),
                status: SaveStatus::Idle,
            });
            (session.id, session.key.clone())
        };

        if !key.has_user() {
            return Ok(());
        }

        let removed = self
            .cache
            .remove(&key.cache_key())
            .await
            .with_context(|| format!("failed to clear local notes for {key}"));

        let mut slot = self.session.lock().await;
        let session = current(&mut slot, session_id);
        match removed {
            Err(err) => {
                log_error!("{err:#}");
                if let Some(session) = session {
                    session.status = SaveStatus::Error;
                    self.emit(NoteEvent::StatusChanged {
                        key,
                        status: SaveStatus::Error,
                    });
                }
                Err(err)
            }
            Ok(()) => {
                log_info!("Cleared notes for {key}");
                let pending = PendingSync {
                    note: RemoteNote::default(),
                    announce: false,
                };
                match session {
                    Some(session) => self.schedule_remote(session, pending, Duration::ZERO),
                    None => self.spawn_detached_push(key, pending.note),
                }
                Ok(())
            }
        }
    }

    /// Runs any armed autosave and pending remote push immediately.
    pub async fn flush(&self) {
        let (session_id, autosave) = {
            let mut slot = self.session.lock().await;
            let Some(session) = slot.as_mut() else {
                return;
            };
            (session.id, session.autosave_task.take())
        };

        if let Some(handle) = autosave {
            handle.abort();
            self.run_autosave(session_id).await;
        }

        let remote_task = {
            let mut slot = self.session.lock().await;
            current(&mut slot, session_id).and_then(|session| session.remote_task.take())
        };
        if let Some(handle) = remote_task {
            handle.abort();
            let _ = handle.await;
        }

        self.push_pending(session_id).await;
    }

    /// Closes the open note. Unsaved edits are dropped; a pending remote push
    /// of already saved content still goes out.
    pub async fn close(&self) {
        let mut slot = self.session.lock().await;
        if let Some(mut previous) = slot.take() {
            self.retire(&mut previous);
        }
    }

    fn retire(&self, previous: &mut DocumentSession) {
        previous.teardown();
        if let Some(pending) = previous.pending_remote.take() {
            log_info!(
                "Pushing saved notes for {} before switching away",
                previous.key
            );
            self.spawn_detached_push(previous.key.clone(), pending.note);
        }
    }

    fn emit(&self, event: NoteEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn notify(&self, key: &NoteKey, notice: Notice) {
        self.emit(NoteEvent::Notice {
            key: key.clone(),
            notice,
        });
    }

    async fn read_cached(&self, key: &NoteKey) -> Result<Option<CachedNote>> {
        let Some(raw) = self.cache.read(&key.cache_key()).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<CachedNote>(&raw) {
            Ok(cached) => Ok(Some(cached)),
            Err(err) => {
                log_warn!("Ignoring unreadable cache entry for {key}: {err}");
                Ok(None)
            }
        }
    }

    async fn write_cached(&self, key: &NoteKey, note: &CachedNote) -> Result<()> {
        let raw = serde_json::to_string(note).context("failed to serialize cached note")?;
        self.cache
            .write(&key.cache_key(), &raw)
            .await
            .with_context(|| format!("failed to write local notes for {key}"))
    }

    async fn finish_loading(&self, session_id: Uuid) {
        let mut slot = self.session.lock().await;
        if let Some(session) = current(&mut slot, session_id) {
            self.loading_settled(session);
        }
    }

    /// Hydration is over. Migrated cache content and edits made while loading
    /// are still unsaved, so they get the regular autosave debounce.
    fn loading_settled(&self, session: &mut DocumentSession) {
        session.load = LoadStatus::Idle;
        self.emit(NoteEvent::LoadChanged {
            key: session.key.clone(),
            load: LoadStatus::Idle,
        });
        if session.has_changes() {
            log_debug!("Unsaved content in {} after loading", session.key);
            self.arm_autosave(session);
        }
    }

    fn arm_autosave(&self, session: &mut DocumentSession) {
        if let Some(handle) = session.autosave_task.take() {
            handle.abort();
        }
        let this = self.clone();
        let session_id = session.id;
        let delay = self.autosave_delay;
        session.autosave_task = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            this.run_autosave(session_id).await;
        }));
    }

    async fn apply_remote(self, session_id: Uuid, key: NoteKey, token: CancellationToken) {
        let fetched = tokio::select! {
            _ = token.cancelled() => {
                log_debug!("Dropped remote fetch for {key}: note was closed");
                return;
            }
            result = self.remote.fetch(&key) => result,
        };

        let remote = match fetched {
            Ok(remote) => remote,
            Err(err) => {
                log_warn!("Remote notes for {key} unavailable, keeping local copy: {err:#}");
                self.finish_loading(session_id).await;
                return;
            }
        };

        let _saving = self.save_lock.lock().await;
        let mut slot = self.session.lock().await;
        let Some(session) = current(&mut slot, session_id).filter(|_| !token.is_cancelled())
        else {
            log_info!("Discarded stale remote notes for {key}");
            return;
        };

        match (reconcile(session.last_saved.as_ref(), remote.as_ref()), remote) {
            (Decision::TakeRemote, Some(remote)) => {
                let document =
                    document_from_remote(&remote, &session.document.images).sanitized();
                let saved_at = Utc::now();
                let record = CachedNote::from_document(&document, saved_at);
                match self.write_cached(&key, &record).await {
                    Ok(()) => {
                        session.last_saved = Some(document.clone());
                        session.last_saved_at = Some(saved_at);
                    }
                    Err(err) => log_error!("Failed to cache remote notes for {key}: {err:#}"),
                }
                session.document = document.clone();
                log_info!("Remote notes for {key} replaced the local copy");
                self.emit(NoteEvent::RemoteApplied {
                    key: key.clone(),
                    document,
                });
            }
            _ => log_debug!("Keeping local notes for {key}"),
        }

        self.loading_settled(session);
    }

    async fn persist(&self, session_id: Uuid, document: Document, silent: bool) -> Result<()> {
        let _saving = self.save_lock.lock().await;
        let key = {
            let mut slot = self.session.lock().await;
            let Some(session) = current(&mut slot, session_id) else {
                bail!("note was closed before it could be saved");
            };
            if !session.key.has_user() {
                if !silent {
                    self.notify(&session.key, Notice::error("Sign in to save your notes"));
                }
                bail!(
                    "cannot save notes for question {} without a signed-in user",
                    session.key.question_id
                );
            }
            session.status = SaveStatus::Saving;
            self.emit(NoteEvent::StatusChanged {
                key: session.key.clone(),
                status: SaveStatus::Saving,
            });
            session.key.clone()
        };

        let sanitized = document.sanitized();
        let saved_at = Utc::now();
        let written = self
            .write_cached(&key, &CachedNote::from_document(&sanitized, saved_at))
            .await;

        let mut slot = self.session.lock().await;
        let session = current(&mut slot, session_id);
        match written {
            Err(err) => {
                log_error!("{err:#}");
                if let Some(session) = session {
                    session.status = SaveStatus::Error;
                    self.emit(NoteEvent::StatusChanged {
                        key: key.clone(),
                        status: SaveStatus::Error,
                    });
                }
                if !silent {
                    self.notify(&key, Notice::error("Could not save your notes"));
                }
                Err(err)
            }
            Ok(()) => {
                log_debug!("Saved notes for {key} locally");
                let pending = PendingSync {
                    note: RemoteNote::from(&sanitized),
                    announce: !silent,
                };
                match session {
                    Some(session) => {
                        session.status = SaveStatus::Saved;
                        session.last_saved = Some(sanitized);
                        session.last_saved_at = Some(saved_at);
                        self.schedule_remote(session, pending, self.remote_sync_delay);
                        self.emit(NoteEvent::StatusChanged {
                            key: key.clone(),
                            status: SaveStatus::Saved,
                        });
                    }
                    // Closed mid-write; the cache has it, so the server should too.
                    None => self.spawn_detached_push(key.clone(), pending.note),
                }
                if !silent {
                    self.notify(&key, Notice::success("Notes saved"));
                }
                Ok(())
            }
        }
    }

    fn schedule_remote(&self, session: &mut DocumentSession, pending: PendingSync, delay: Duration) {
        if let Some(handle) = session.remote_task.take() {
            handle.abort();
        }
        session.pending_remote = Some(pending);

        let this = self.clone();
        let session_id = session.id;
        session.remote_task = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            this.push_pending(session_id).await;
        }));
    }

    async fn push_pending(&self, session_id: Uuid) {
        let (key, pending) = {
            let mut slot = self.session.lock().await;
            let Some(session) = current(&mut slot, session_id) else {
                return;
            };
            let Some(pending) = session.pending_remote.clone() else {
                return;
            };
            (session.key.clone(), pending)
        };

        let result = self.remote.store(&key, &pending.note).await;

        {
            let mut slot = self.session.lock().await;
            if let Some(session) = current(&mut slot, session_id) {
                if session.pending_remote.as_ref() == Some(&pending) {
                    session.pending_remote = None;
                }
            }
        }

        match result {
            Ok(()) => log_debug!("Synced notes for {key} to the remote store"),
            Err(err) => {
                log_warn!("Remote sync for {key} failed, local copy kept: {err:#}");
                if pending.announce {
                    self.notify(
                        &key,
                        Notice::warning("Saved on this device, but syncing to the server failed"),
                    );
                }
            }
        }
    }

    async fn run_autosave(&self, session_id: Uuid) {
        let document = {
            let mut slot = self.session.lock().await;
            let Some(session) = current(&mut slot, session_id) else {
                return;
            };
            // Detach: later edits must not abort the write below.
            session.autosave_task = None;

            if !session.has_changes() {
                if let Some(pending) = session.pending_remote.clone() {
                    if session.remote_task.is_none() {
                        self.schedule_remote(session, pending, self.remote_sync_delay);
                    }
                }
                return;
            }
            session.document.clone()
        };

        if let Err(err) = self.persist(session_id, document, true).await {
            log_warn!("Autosave failed: {err:#}");
        }
    }

    fn spawn_detached_push(&self, key: NoteKey, note: RemoteNote) {
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            if let Err(err) = remote.store(&key, &note).await {
                log_warn!("Remote sync for {key} failed: {err:#}");
            }
        });
    }
}
