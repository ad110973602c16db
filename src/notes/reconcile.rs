use crate::images::{ImageRecord, ImageRegistry};
use crate::placeholder::{distinct_ids, strip_orphans};

use super::{Document, RemoteNote};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    KeepLocal,
    TakeRemote,
}

/// Decides which tier a freshly loaded note should show.
///
/// `local` is what the local cache holds, `remote` what the server returned
/// (`None` when it has no record). Remote wins whenever it differs from local,
/// compared in the remote store's own shape; an empty remote never replaces a
/// missing local entry.
pub fn reconcile(local: Option<&Document>, remote: Option<&RemoteNote>) -> Decision {
    let Some(remote) = remote else {
        return Decision::KeepLocal;
    };

    match local {
        Some(local) if RemoteNote::from(local) == *remote => Decision::KeepLocal,
        Some(_) => Decision::TakeRemote,
        None if remote.is_empty() => Decision::KeepLocal,
        None => Decision::TakeRemote,
    }
}

/// Rebuilds a document from a remote record.
///
/// Ids come from the body and are paired with urls by position. Placeholders
/// ranked past the end of the url list are dropped from the body; urls beyond
/// the referenced ids become unreferenced records under fresh ids.
/// Descriptions carry over from `previous` where id or url match, and legacy
/// tokens in the remote text are migrated last.
pub fn document_from_remote(remote: &RemoteNote, previous: &ImageRegistry) -> Document {
    let body = strip_orphans(&remote.notes, &remote.notes_image_urls);
    let mut images = previous.reconcile_against_urls(&body, &remote.notes_image_urls);

    let referenced = distinct_ids(&body).len();
    for url in remote.notes_image_urls.iter().skip(referenced) {
        let url = url.trim();
        if url.is_empty() || images.find_by_url(url).is_some() {
            continue;
        }
        let description = previous
            .find_by_url(url)
            .map(|record: &ImageRecord| record.description.clone())
            .unwrap_or_default();
        images.insert(url, description);
    }

    let mut document = Document::new(body, images);
    document.migrate_legacy();
    document
}
