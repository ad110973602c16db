use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{header::CONTENT_TYPE, StatusCode, Url};

use crate::images::{UploadFile, UploadService, UploadedImage};
use crate::notes::{NoteKey, RemoteNote};

use super::RemoteNoteStore;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Remote note store over HTTP.
///
/// `GET` and `POST` both target `{base}/users/{user}/questions/{question}/notes`
/// with a `{ notes, notesImageUrls }` JSON body. A 404 on `GET` means no record.
#[derive(Debug, Clone)]
pub struct HttpNoteStore {
    client: reqwest::Client,
    base_url: Url,
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let parsed =
        Url::parse(base_url).with_context(|| format!("invalid remote base url '{base_url}'"))?;
    if parsed.cannot_be_a_base() {
        return Err(anyhow!("remote base url '{parsed}' cannot hold a path"));
    }
    Ok(parsed)
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("failed to build HTTP client")
}

fn with_segments<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("remote base url cannot hold a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl HttpNoteStore {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: parse_base_url(base_url)?,
        })
    }

    pub fn endpoint(&self, key: &NoteKey) -> Result<Url> {
        with_segments(
            &self.base_url,
            [
                "users",
                key.user_id.as_str(),
                "questions",
                key.question_id.as_str(),
                "notes",
            ],
        )
    }
}

/// Upload service on the same server: the raw bytes are `POST`ed to
/// `{base}/uploads/{file name}` with the file's MIME type, and the reply is
/// `{ url, name }`.
#[derive(Debug, Clone)]
pub struct HttpUploadService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpUploadService {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: parse_base_url(base_url)?,
        })
    }

    pub fn endpoint(&self, file_name: &str) -> Result<Url> {
        with_segments(&self.base_url, ["uploads", file_name])
    }
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn upload(&self, file: &UploadFile) -> Result<UploadedImage> {
        let url = self.endpoint(&file.name)?;
        let uploaded = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, file.mime_type.as_str())
            .body(file.bytes.clone())
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {url} was rejected"))?
            .json::<UploadedImage>()
            .await
            .with_context(|| format!("POST {url} returned an unreadable body"))?;
        debug!("uploaded {} to {}", file.name, uploaded.url);
        Ok(uploaded)
    }
}

#[async_trait]
impl RemoteNoteStore for HttpNoteStore {
    async fn fetch(&self, key: &NoteKey) -> Result<Option<RemoteNote>> {
        let url = self.endpoint(key)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("no remote notes for {key}");
            return Ok(None);
        }

        let note = response
            .error_for_status()
            .with_context(|| format!("GET {url} was rejected"))?
            .json::<RemoteNote>()
            .await
            .with_context(|| format!("GET {url} returned an unreadable body"))?;
        Ok(Some(note))
    }

    async fn store(&self, key: &NoteKey, note: &RemoteNote) -> Result<()> {
        let url = self.endpoint(key)?;
        self.client
            .post(url.clone())
            .json(note)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {url} was rejected"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_note_path() {
        let store = HttpNoteStore::new("http://localhost:8080/api/").expect("store");
        let url = store.endpoint(&NoteKey::new("u42", "q7")).expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/users/u42/questions/q7/notes"
        );
    }

    #[test]
    fn endpoint_escapes_path_segments() {
        let store = HttpNoteStore::new("https://notes.example").expect("store");
        let url = store.endpoint(&NoteKey::new("a/b", "q 1")).expect("url");
        assert_eq!(
            url.as_str(),
            "https://notes.example/users/a%2Fb/questions/q%201/notes"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(HttpNoteStore::new("not a url").is_err());
        assert!(HttpNoteStore::new("mailto:someone@example.com").is_err());
        assert!(HttpUploadService::new("mailto:someone@example.com").is_err());
    }

    #[test]
    fn upload_endpoint_sits_next_to_notes() {
        let uploads = HttpUploadService::new("http://localhost:8080/api/").expect("service");
        let url = uploads.endpoint("free body.png").expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/uploads/free%20body.png"
        );
    }
}
