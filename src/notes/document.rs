use serde::{Deserialize, Serialize};

use crate::images::{ImageRecord, ImageRegistry};
use crate::placeholder::{self, Segment};

/// A note body together with the images its placeholders point at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub body: String,
    #[serde(default)]
    pub images: ImageRegistry,
}

impl Document {
    pub fn new(body: impl Into<String>, images: ImageRegistry) -> Self {
        Self {
            body: body.into(),
            images,
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(body, ImageRegistry::default())
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.images.is_empty()
    }

    /// Registers an image and drops its placeholder at a character offset.
    pub fn insert_image(
        &mut self,
        cursor: usize,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> String {
        let id = self.images.insert(url, description);
        self.body = placeholder::insert_at(&self.body, cursor, &id);
        id
    }

    pub fn update_image(
        &mut self,
        id: &str,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> bool {
        self.images.update(id, url, description)
    }

    /// Removes the record and every placeholder that referenced it.
    pub fn remove_image(&mut self, id: &str) -> Option<ImageRecord> {
        self.body = placeholder::remove_references(&self.body, id);
        self.images.remove(id)
    }

    /// Rewrites legacy tokens in place. Returns whether anything changed.
    pub fn migrate_legacy(&mut self) -> bool {
        if !placeholder::codec::has_legacy_tokens(&self.body) {
            return false;
        }
        let (body, images) = placeholder::migrate_legacy(&self.body, &self.images);
        self.body = body;
        self.images = images;
        true
    }

    pub fn orphaned_ids(&self) -> Vec<String> {
        self.images.orphans(&self.body)
    }

    pub fn segments(&self) -> Vec<Segment<'_>> {
        placeholder::segments(&self.body, &self.images)
    }

    /// The form of this document that is allowed to reach storage: no
    /// placeholder may point at a missing or url-less record. The registry is
    /// kept whole so pending uploads can still resolve.
    pub fn sanitized(&self) -> Document {
        Document {
            body: placeholder::strip_unresolved(&self.body, &self.images),
            images: self.images.clone(),
        }
    }

    /// Urls in the order the remote store expects: first by where their id
    /// first appears in the body, then unreferenced resolved images in registry
    /// order. Pairing these positionally with `distinct_ids(body)` on load gets
    /// every referenced id back.
    pub fn ordered_image_urls(&self) -> Vec<String> {
        let referenced = placeholder::distinct_ids(&self.body);
        let mut urls: Vec<String> = referenced
            .iter()
            .filter_map(|id| self.images.get(id))
            .filter(|record| record.is_resolved())
            .map(|record| record.url.clone())
            .collect();

        urls.extend(
            self.images
                .iter()
                .filter(|record| record.is_resolved() && !referenced.contains(&record.id.as_str()))
                .map(|record| record.url.clone()),
        );
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::extract_ids;

    #[test]
    fn insert_and_remove_image_keep_text_and_registry_in_step() {
        let mut doc = Document::text("before after");
        let id = doc.insert_image(7, "http://x/1.png", "chart");
        assert_eq!(doc.body, format!("before [IMAGE:{id}]after"));
        assert_eq!(doc.images.len(), 1);

        let removed = doc.remove_image(&id).expect("record");
        assert_eq!(removed.description, "chart");
        assert_eq!(doc.body, "before after");
        assert!(doc.images.is_empty());
    }

    #[test]
    fn migrate_legacy_reports_changes() {
        let mut doc = Document::text("[IMAGE:http://x/1.png|cap]");
        assert!(doc.migrate_legacy());
        assert_eq!(doc.images.len(), 1);
        assert!(!doc.migrate_legacy());
    }

    #[test]
    fn sanitized_strips_unresolved_and_missing_references() {
        let mut doc = Document::text("");
        let pending = doc.insert_image(0, "", "todo");
        let good = doc.insert_image(0, "http://x/1.png", "ok");
        doc.body.push_str(" [IMAGE:ghost]\n");

        let clean = doc.sanitized();
        assert_eq!(extract_ids(&clean.body), vec![good.clone()]);
        assert!(!clean.body.contains(&pending));
        assert_eq!(clean.images, doc.images);
    }

    #[test]
    fn sanitized_is_stable_for_clean_documents() {
        let mut doc = Document::text("line\n");
        doc.insert_image(0, "http://x/1.png", "");
        assert_eq!(doc.sanitized(), doc);
    }

    #[test]
    fn ordered_urls_follow_body_order() {
        let mut doc = Document::text("");
        let first = doc.images.insert("http://x/1.png", "");
        let second = doc.images.insert("http://x/2.png", "");
        doc.images.insert("http://x/3.png", "");
        doc.images.insert("", "pending");
        doc.body = format!("[IMAGE:{second}] then [IMAGE:{first}] [IMAGE:{second}]");

        assert_eq!(
            doc.ordered_image_urls(),
            vec!["http://x/2.png", "http://x/1.png", "http://x/3.png"]
        );
    }
}
