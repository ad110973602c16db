use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::placeholder::distinct_ids;

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Fresh image id: millisecond timestamp, a process-wide sequence number and a
/// random suffix. Unique for the lifetime of the process.
pub fn generate_image_id() -> String {
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|byte| char::from(byte).to_ascii_lowercase())
        .collect();
    format!("img_{}_{}_{}", Utc::now().timestamp_millis(), sequence, suffix)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl ImageRecord {
    /// Records without a url are placeholders the user still has to attach.
    pub fn is_resolved(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Ordered image records for one document. Order is insertion order, not the
/// order tokens appear in the text. Ids are unique; duplicates arriving through
/// deserialization keep their first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ImageRecord>", into = "Vec<ImageRecord>")]
pub struct ImageRegistry {
    records: Vec<ImageRecord>,
}

impl From<Vec<ImageRecord>> for ImageRegistry {
    fn from(records: Vec<ImageRecord>) -> Self {
        let mut seen = HashSet::new();
        let records = records
            .into_iter()
            .filter(|record| seen.insert(record.id.clone()))
            .collect();
        Self { records }
    }
}

impl From<ImageRegistry> for Vec<ImageRecord> {
    fn from(registry: ImageRegistry) -> Self {
        registry.records
    }
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ImageRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn find_by_url(&self, url: &str) -> Option<&ImageRecord> {
        self.records.iter().find(|record| record.url == url)
    }

    /// Appends a record under a freshly generated id and returns that id.
    pub fn insert(&mut self, url: impl Into<String>, description: impl Into<String>) -> String {
        let mut id = generate_image_id();
        while self.get(&id).is_some() {
            id = generate_image_id();
        }

        self.records.push(ImageRecord {
            id: id.clone(),
            url: url.into(),
            description: description.into(),
        });
        id
    }

    /// Returns `false` when no record has `id`.
    pub fn update(
        &mut self,
        id: &str,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> bool {
        match self.records.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.url = url.into();
                record.description = description.into();
                true
            }
            None => false,
        }
    }

    /// Removes the record only; text references are the caller's concern.
    pub fn remove(&mut self, id: &str) -> Option<ImageRecord> {
        let index = self.records.iter().position(|record| record.id == id)?;
        Some(self.records.remove(index))
    }

    /// Urls of resolved records, in registry order.
    pub fn resolved_urls(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| record.is_resolved())
            .map(|record| record.url.clone())
            .collect()
    }

    /// Ids referenced in `body` that have no resolved record here.
    pub fn orphans(&self, body: &str) -> Vec<String> {
        distinct_ids(body)
            .into_iter()
            .filter(|id| !self.get(id).is_some_and(ImageRecord::is_resolved))
            .map(str::to_string)
            .collect()
    }

    /// Rebuilds a registry from a body and a url list that carries no ids.
    ///
    /// The n-th distinct id in `body` takes the n-th url. Ids past the end of
    /// `urls` and pairs with an empty url are dropped. Descriptions come from
    /// this registry, matched by id first and by url second.
    pub fn reconcile_against_urls<S: AsRef<str>>(&self, body: &str, urls: &[S]) -> ImageRegistry {
        let mut rebuilt = ImageRegistry::default();
        for (id, url) in distinct_ids(body).into_iter().zip(urls) {
            let url = url.as_ref().trim();
            if url.is_empty() {
                continue;
            }
            rebuilt.records.push(ImageRecord {
                id: id.to_string(),
                url: url.to_string(),
                description: self.description_for(id, url),
            });
        }
        rebuilt
    }

    pub(crate) fn description_for(&self, id: &str, url: &str) -> String {
        self.get(id)
            .or_else(|| self.find_by_url(url))
            .map(|record| record.description.clone())
            .unwrap_or_default()
    }
}
