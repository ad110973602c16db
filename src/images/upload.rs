use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notes::Document;

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub allowed_mime_prefix: String,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_mime_prefix: "image/".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{name} is empty")]
    Empty { name: String },
    #[error("{name} has type {mime_type}, which is not an image")]
    NotAnImage { name: String, mime_type: String },
    #[error("{name} is {size} bytes; uploads are limited to {limit} bytes")]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("{name} does not contain a recognizable image")]
    UnrecognizedContent { name: String },
    #[error("upload of {name} failed: {message}")]
    Transport { name: String, message: String },
}

/// Transport that turns a file into a hosted url.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn upload(&self, file: &UploadFile) -> anyhow::Result<UploadedImage>;
}

/// Client-side checks run before anything is sent.
pub fn validate_upload(file: &UploadFile, limits: &UploadLimits) -> Result<(), UploadError> {
    let name = file.name.clone();

    if file.bytes.is_empty() {
        return Err(UploadError::Empty { name });
    }

    let mime_type = file.mime_type.trim().to_ascii_lowercase();
    if !mime_type.starts_with(&limits.allowed_mime_prefix.to_ascii_lowercase()) {
        return Err(UploadError::NotAnImage {
            name,
            mime_type: file.mime_type.clone(),
        });
    }

    let size = file.bytes.len() as u64;
    if size > limits.max_bytes {
        return Err(UploadError::TooLarge {
            name,
            size,
            limit: limits.max_bytes,
        });
    }

    if image::guess_format(&file.bytes).is_err() {
        return Err(UploadError::UnrecognizedContent { name });
    }

    Ok(())
}

/// Validates, uploads, registers and splices the placeholder at `cursor`.
/// On any failure `document` is left untouched.
pub async fn attach_upload(
    document: &mut Document,
    cursor: usize,
    file: &UploadFile,
    service: &dyn UploadService,
    limits: &UploadLimits,
) -> Result<String, UploadError> {
    validate_upload(file, limits)?;

    let uploaded = service.upload(file).await.map_err(|err| {
        warn!("upload of {} failed: {err:#}", file.name);
        UploadError::Transport {
            name: file.name.clone(),
            message: format!("{err:#}"),
        }
    })?;

    if uploaded.url.trim().is_empty() {
        return Err(UploadError::Transport {
            name: file.name.clone(),
            message: "upload service returned no url".into(),
        });
    }

    let description = if uploaded.name.trim().is_empty() {
        file.name.clone()
    } else {
        uploaded.name
    };
    let id = document.insert_image(cursor, uploaded.url, description);
    info!("attached {} as image {id}", file.name);
    Ok(id)
}
