use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Document, NoteKey};

/// `Idle → Saving → Saved → Idle`, or `Saving → Error` when the local cache
/// rejects a write. The next edit moves `Saved` back to `Idle`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// Tracks hydration separately from saving.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// User-facing message. Only explicit saves and failures produce these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum NoteEvent {
    StatusChanged {
        key: NoteKey,
        status: SaveStatus,
    },
    LoadChanged {
        key: NoteKey,
        load: LoadStatus,
    },
    /// Remote state replaced what hydration showed first.
    RemoteApplied {
        key: NoteKey,
        document: Document,
    },
    Notice {
        key: NoteKey,
        notice: Notice,
    },
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NoteSnapshot {
    pub key: Option<NoteKey>,
    pub document: Document,
    pub status: SaveStatus,
    pub load: LoadStatus,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub has_changes: bool,
}
