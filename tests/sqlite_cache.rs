use std::sync::Arc;

use lecture_notes_lib::{
    db::Database,
    notes::{CachedNote, Document, NoteKey, NoteSyncManager},
    settings::SyncSettings,
    storage::{MemoryRemoteStore, NoteCache},
};
use tempfile::TempDir;

fn open(temp: &TempDir) -> Database {
    Database::new(temp.path().join("notes.sqlite3")).unwrap()
}

#[tokio::test]
async fn entries_round_trip_and_survive_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let db = open(&temp);
        db.put_cache_entry("notes_u1_q1", "first").await.unwrap();
        db.put_cache_entry("notes_u1_q1", "second").await.unwrap();
        db.put_cache_entry("notes_u2_q1", "other user").await.unwrap();
    }

    let db = open(&temp);
    let entry = db.get_cache_entry("notes_u1_q1").await.unwrap().unwrap();
    assert_eq!(entry.value, "second");
    assert!(db.cache_entry_exists("notes_u2_q1").await.unwrap());
    assert!(db.get_cache_entry("notes_u9_q1").await.unwrap().is_none());
}

#[tokio::test]
async fn listing_is_scoped_to_a_literal_prefix() {
    let temp = TempDir::new().unwrap();
    let db = open(&temp);
    db.put_cache_entry("notes_u1_q1", "a").await.unwrap();
    db.put_cache_entry("notes_u1_q2", "b").await.unwrap();
    db.put_cache_entry("notes_u10_q1", "c").await.unwrap();
    db.put_cache_entry("notesXu1Xq3", "d").await.unwrap();

    let mut keys: Vec<String> = db
        .list_cache_entries("notes_u1_")
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["notes_u1_q1", "notes_u1_q2"]);
}

#[tokio::test]
async fn removing_is_idempotent_through_the_cache_trait() {
    let temp = TempDir::new().unwrap();
    let db = open(&temp);
    let cache: &dyn NoteCache = &db;

    cache.write("notes_u1_q1", "value").await.unwrap();
    assert_eq!(
        cache.read("notes_u1_q1").await.unwrap().as_deref(),
        Some("value")
    );
    cache.remove("notes_u1_q1").await.unwrap();
    cache.remove("notes_u1_q1").await.unwrap();
    assert!(cache.read("notes_u1_q1").await.unwrap().is_none());
}

#[tokio::test]
async fn saved_notes_are_there_after_a_restart() {
    let temp = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemoteStore::new());
    let key = NoteKey::new("u1", "q1");

    let mut document = Document::text("Kinematics: ");
    let id = document.insert_image(12, "https://cdn.example/graph.png", "v-t graph");

    {
        let db = open(&temp);
        let notes = NoteSyncManager::new(Arc::new(db), remote.clone(), &SyncSettings::default());
        notes.hydrate("u1", "q1").await.unwrap();
        notes.wait_for_remote().await;
        notes.save(document.clone(), true).await.unwrap();
        notes.flush().await;
        notes.close().await;
    }

    let db = open(&temp);
    let raw = db.get_cache_entry(&key.cache_key()).await.unwrap().unwrap();
    let cached: CachedNote = serde_json::from_str(&raw.value).unwrap();
    assert_eq!(cached.value, document.body);

    let notes = NoteSyncManager::new(Arc::new(db), remote.clone(), &SyncSettings::default());
    let restored = notes.hydrate("u1", "q1").await.unwrap();
    assert_eq!(restored.body, format!("Kinematics: [IMAGE:{id}]"));
    assert_eq!(
        restored.images.get(&id).map(|record| record.description.as_str()),
        Some("v-t graph")
    );

    notes.wait_for_remote().await;
    assert_eq!(notes.snapshot().await.document, restored);
}
