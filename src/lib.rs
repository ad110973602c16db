pub mod comments;
pub mod db;
pub mod images;
pub mod notes;
pub mod placeholder;
pub mod settings;
pub mod storage;
mod utils;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use image::ImageFormat;
use log::{error, info};

use db::Database;
use images::{attach_upload, UploadError, UploadFile, UploadService};
use notes::{Document, NoteEvent, NoteSyncManager, NoticeLevel};
use placeholder::Segment;
use settings::SettingsStore;
use storage::{HttpNoteStore, HttpUploadService, LocalOnly, RemoteNoteStore};

pub const HOME_ENV: &str = "LECTURE_NOTES_HOME";

/// Everything a front end needs: settings, the SQLite cache, the sync
/// manager wired to the configured remote, and the upload service when a
/// server is configured.
pub struct NotesApp {
    pub settings: SettingsStore,
    pub db: Database,
    pub notes: NoteSyncManager,
    pub uploader: Option<HttpUploadService>,
}

impl NotesApp {
    pub fn open(home: &Path) -> Result<Self> {
        std::fs::create_dir_all(home)
            .with_context(|| format!("failed to create {}", home.display()))?;

        let settings = SettingsStore::new(home.join("settings.json"))?;
        let config = settings.settings();

        let db_path = config
            .cache_path
            .clone()
            .unwrap_or_else(|| home.join("notes.sqlite3"));
        let db = Database::new(db_path)?;

        let (remote, uploader) = match config.remote_base_url.as_deref() {
            Some(url) => {
                info!("Syncing notes with {url}");
                (
                    Arc::new(HttpNoteStore::new(url)?) as Arc<dyn RemoteNoteStore>,
                    Some(HttpUploadService::new(url)?),
                )
            }
            None => {
                info!("No remote configured; notes stay on this device");
                (Arc::new(LocalOnly) as Arc<dyn RemoteNoteStore>, None)
            }
        };

        let notes = NoteSyncManager::new(Arc::new(db.clone()), remote, &config.sync);
        Ok(Self {
            settings,
            db,
            notes,
            uploader,
        })
    }

    /// Uploads `file` through `service` under the configured upload limits and
    /// splices its placeholder into `document` at `cursor`.
    pub async fn attach_image(
        &self,
        document: &mut Document,
        cursor: usize,
        file: &UploadFile,
        service: &dyn UploadService,
    ) -> Result<String, UploadError> {
        let limits = self.settings.settings().upload;
        attach_upload(document, cursor, file, service, &limits).await
    }
}

async fn read_upload(path: &str) -> Result<UploadFile> {
    let path = Path::new(path);
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mime_type = ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".into());
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    Ok(UploadFile {
        name,
        mime_type,
        bytes,
    })
}

fn home_dir() -> PathBuf {
    std::env::var_os(HOME_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".lecture-notes"))
}

const USAGE: &str = "usage:
  lecture-notes show  <user> <question>
  lecture-notes save  <user> <question> <text...>
  lecture-notes clear <user> <question>
  lecture-notes attach <user> <question> <image file>
  lecture-notes list  <user>";

pub fn run() {
    let level = if settings::debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(err) = run_cli(&args) {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run_cli(args: &[String]) -> Result<()> {
    let app = NotesApp::open(&home_dir())?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(dispatch(&app, args))
}

async fn dispatch(app: &NotesApp, args: &[String]) -> Result<()> {
    let mut events = app.notes.subscribe();

    match args {
        [command, user] if command == "list" => {
            let prefix = format!("notes_{user}_");
            for entry in app.db.list_cache_entries(&prefix).await? {
                let question = entry.key.strip_prefix(&prefix).unwrap_or(&entry.key);
                println!("{question}\t{}", entry.updated_at.to_rfc3339());
            }
        }
        [command, user, question] if command == "show" => {
            app.notes.hydrate(user, question).await?;
            app.notes.wait_for_remote().await;
            let snapshot = app.notes.snapshot().await;
            for segment in snapshot.document.segments() {
                match segment {
                    Segment::Text(text) => print!("{text}"),
                    Segment::Image(record) if record.description.is_empty() => {
                        print!("[image {}]", record.url)
                    }
                    Segment::Image(record) => print!("[image: {}]", record.description),
                    Segment::Unresolved { id, .. } => print!("[missing image {id}]"),
                }
            }
            println!();
        }
        [command, user, question, text @ ..] if command == "save" && !text.is_empty() => {
            app.notes.hydrate(user, question).await?;
            app.notes.wait_for_remote().await;
            let mut document = app.notes.snapshot().await.document;
            document.body = text.join(" ");
            app.notes.save(document, false).await?;
            app.notes.flush().await;
        }
        [command, user, question, path] if command == "attach" => {
            let uploader = app
                .uploader
                .as_ref()
                .context("attaching images needs a remote base url")?;
            let file = read_upload(path).await?;
            app.notes.hydrate(user, question).await?;
            app.notes.wait_for_remote().await;
            let mut document = app.notes.snapshot().await.document;
            let cursor = document.body.chars().count();
            let id = app
                .attach_image(&mut document, cursor, &file, uploader)
                .await?;
            app.notes.save(document, false).await?;
            app.notes.flush().await;
            println!("attached {} as {id}", file.name);
        }
        [command, user, question] if command == "clear" => {
            app.notes.hydrate(user, question).await?;
            app.notes.clear().await?;
            app.notes.flush().await;
        }
        _ => bail!("{USAGE}"),
    }

    while let Ok(event) = events.try_recv() {
        if let NoteEvent::Notice { notice, .. } = event {
            match notice.level {
                NoticeLevel::Success => println!("{}", notice.message),
                NoticeLevel::Warning | NoticeLevel::Error => eprintln!("{}", notice.message),
            }
        }
    }
    Ok(())
}
