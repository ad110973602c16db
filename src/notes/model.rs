//! Records exchanged with the two storage tiers.
//!
//! The local cache keeps full image records; the remote store only keeps a
//! url list next to the text, so ids there are implied by position.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::images::ImageRegistry;

use super::Document;

/// Identifies one note: a user's notes on one question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteKey {
    pub user_id: String,
    pub question_id: String,
}

impl NoteKey {
    pub fn new(user_id: impl Into<String>, question_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            question_id: question_id.into(),
        }
    }

    /// Notes are only persisted for signed-in users.
    pub fn has_user(&self) -> bool {
        !self.user_id.trim().is_empty()
    }

    pub fn cache_key(&self) -> String {
        format!("notes_{}_{}", self.user_id, self.question_id)
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.question_id)
    }
}

/// Value stored in the local cache under [`NoteKey::cache_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedNote {
    pub value: String,
    #[serde(default)]
    pub images: ImageRegistry,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_saved_at: DateTime<Utc>,
}

impl CachedNote {
    pub fn from_document(document: &Document, saved_at: DateTime<Utc>) -> Self {
        Self {
            value: document.body.clone(),
            images: document.images.clone(),
            last_saved_at: saved_at,
        }
    }

    pub fn to_document(&self) -> Document {
        Document::new(self.value.clone(), self.images.clone())
    }
}

/// Whole-record payload of the remote note store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNote {
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub notes_image_urls: Vec<String>,
}

impl RemoteNote {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.notes_image_urls.is_empty()
    }
}

impl From<&Document> for RemoteNote {
    fn from(document: &Document) -> Self {
        Self {
            notes: document.body.clone(),
            notes_image_urls: document.ordered_image_urls(),
        }
    }
}
