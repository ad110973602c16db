mod document;
mod manager;
mod model;
mod reconcile;
mod state;

pub use document::Document;
pub use manager::NoteSyncManager;
pub use model::{CachedNote, NoteKey, RemoteNote};
pub use reconcile::{document_from_remote, reconcile, Decision};
pub use state::{LoadStatus, NoteEvent, NoteSnapshot, Notice, NoticeLevel, SaveStatus};
