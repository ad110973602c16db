use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lecture_notes_lib::{
    images::{UploadError, UploadFile, UploadService, UploadedImage},
    notes::Document,
    NotesApp,
};
use tempfile::TempDir;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

#[derive(Default)]
struct CountingUploader {
    calls: AtomicUsize,
}

#[async_trait]
impl UploadService for CountingUploader {
    async fn upload(&self, file: &UploadFile) -> anyhow::Result<UploadedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(UploadedImage {
            url: format!("https://cdn.example/{}", file.name),
            name: file.name.clone(),
        })
    }
}

fn png() -> UploadFile {
    UploadFile {
        name: "diagram.png".into(),
        mime_type: "image/png".into(),
        bytes: PNG_MAGIC.to_vec(),
    }
}

#[tokio::test]
async fn attach_image_honours_configured_upload_limits() {
    let temp = TempDir::new().unwrap();
    let app = NotesApp::open(temp.path()).unwrap();

    let uploader = CountingUploader::default();
    let mut document = Document::text("see ");
    let id = app
        .attach_image(&mut document, 4, &png(), &uploader)
        .await
        .unwrap();
    assert_eq!(document.body, format!("see [IMAGE:{id}]"));

    app.settings
        .update(|settings| settings.upload.max_bytes = 8)
        .unwrap();
    let before = document.clone();
    let err = app
        .attach_image(&mut document, 0, &png(), &uploader)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::TooLarge { limit: 8, .. }));
    assert_eq!(document, before);
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
}
