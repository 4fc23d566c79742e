use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::archiver::ArchiveStats;
use crate::db::{ArchiveStore, DatabaseError};
use crate::discord::DiscordAttachment;

pub mod sniff;

pub use self::sniff::{extension_for, sniff_content_type};

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename pattern"));

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to download {url}: {message}")]
    Http { url: String, message: String },
    #[error("failed to download {url}: status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>, MediaError>;
}

pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self, MediaError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::Http {
                url: String::new(),
                message: format!("failed to build client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        debug!("downloading media from {}", url);

        let http_error = |e: reqwest::Error| MediaError::Http {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(http_error)?;

        if !response.status().is_success() {
            return Err(MediaError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let data = response.bytes().await.map_err(http_error)?.to_vec();
        debug!("downloaded {} bytes from {}", data.len(), url);
        Ok(data)
    }
}

/// Where a downloaded object belongs in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaTarget {
    Attachment {
        channel_id: String,
        message_id: String,
        index: usize,
        filename: String,
    },
    EmbedImage {
        channel_id: String,
        message_id: String,
        index: usize,
    },
    EmbedThumbnail {
        channel_id: String,
        message_id: String,
        index: usize,
    },
    Avatar {
        user_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaJob {
    pub url: String,
    pub target: MediaTarget,
}

impl MediaJob {
    pub fn attachment(
        channel_id: &str,
        message_id: &str,
        index: usize,
        attachment: &DiscordAttachment,
    ) -> Self {
        Self {
            url: attachment.url.clone(),
            target: MediaTarget::Attachment {
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
                index,
                filename: attachment.filename.clone(),
            },
        }
    }

    pub fn embed_image(channel_id: &str, message_id: &str, index: usize, url: &str) -> Self {
        Self {
            url: url.to_string(),
            target: MediaTarget::EmbedImage {
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
                index,
            },
        }
    }

    pub fn embed_thumbnail(channel_id: &str, message_id: &str, index: usize, url: &str) -> Self {
        Self {
            url: url.to_string(),
            target: MediaTarget::EmbedThumbnail {
                channel_id: channel_id.to_string(),
                message_id: message_id.to_string(),
                index,
            },
        }
    }

    pub fn avatar(user_id: &str, url: &str, size: &str) -> Self {
        Self {
            url: with_avatar_size(url, size),
            target: MediaTarget::Avatar {
                user_id: user_id.to_string(),
            },
        }
    }

    /// Archive-relative path for `data`, or `None` when the sniffed content
    /// type has no usable extension.
    pub fn relative_path(&self, data: &[u8]) -> Option<String> {
        let extension = || extension_for(sniff_content_type(data));
        match &self.target {
            MediaTarget::Attachment {
                channel_id,
                message_id,
                index,
                filename,
            } => Some(format!(
                "attachments/{channel_id}/{message_id}-{index}-{}",
                sanitize_filename(filename)
            )),
            MediaTarget::EmbedImage {
                channel_id,
                message_id,
                index,
            } => extension().map(|ext| format!("embeds/{channel_id}/{message_id}-{index}.{ext}")),
            MediaTarget::EmbedThumbnail {
                channel_id,
                message_id,
                index,
            } => extension()
                .map(|ext| format!("embeds/{channel_id}/{message_id}-{index}-thumb.{ext}")),
            MediaTarget::Avatar { user_id } => {
                extension().map(|ext| format!("avatars/{user_id}.{ext}"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Saved(String),
    Dropped { content_type: &'static str },
}

/// Files created during the run, kept so a rollback can take them back out.
#[derive(Debug, Default)]
struct WrittenFiles {
    saved: Vec<PathBuf>,
    /// Temp files between create and rename.
    staged: HashSet<PathBuf>,
}

/// Downloads media into the archive folder under a fixed permit budget.
pub struct MediaFetcher {
    downloader: Arc<dyn Downloader>,
    store: Arc<dyn ArchiveStore>,
    root: PathBuf,
    permits: Arc<Semaphore>,
    stats: Arc<ArchiveStats>,
    written: Mutex<WrittenFiles>,
}

impl MediaFetcher {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        store: Arc<dyn ArchiveStore>,
        root: impl Into<PathBuf>,
        concurrency: usize,
        stats: Arc<ArchiveStats>,
    ) -> Self {
        Self {
            downloader,
            store,
            root: root.into(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            stats,
            written: Mutex::new(WrittenFiles::default()),
        }
    }

    pub fn stats(&self) -> &Arc<ArchiveStats> {
        &self.stats
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free download slot. `None` only if the pool was closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().acquire_owned().await.ok()
    }

    /// Runs one job to completion while holding `permit`, logging the result.
    pub async fn run(&self, job: MediaJob, permit: OwnedSemaphorePermit) {
        let _permit = permit;
        match self.fetch(&job).await {
            Ok(MediaOutcome::Saved(path)) => {
                self.stats.media_saved();
                debug!(url = %job.url, "saved media to {}", path);
            }
            Ok(MediaOutcome::Dropped { content_type }) => {
                self.stats.media_dropped();
                debug!(url = %job.url, "dropped media with content type {}", content_type);
            }
            Err(err) => {
                self.stats.media_failed();
                warn!(url = %job.url, "failed to archive media: {err}");
            }
        }
    }

    pub async fn fetch(&self, job: &MediaJob) -> Result<MediaOutcome, MediaError> {
        let data = self.downloader.download(&job.url).await?;

        let Some(relative) = job.relative_path(&data) else {
            return Ok(MediaOutcome::Dropped {
                content_type: sniff_content_type(&data),
            });
        };

        let path = self.root.join(&relative);
        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        self.write_atomically(&path, &data).await?;
        if !existed {
            self.written.lock().saved.push(path.clone());
        }

        let recorded = match &job.target {
            MediaTarget::Attachment {
                channel_id,
                message_id,
                ..
            }
            | MediaTarget::EmbedImage {
                channel_id,
                message_id,
                ..
            }
            | MediaTarget::EmbedThumbnail {
                channel_id,
                message_id,
                ..
            } => {
                self.store
                    .insert_file(channel_id, message_id, &relative)
                    .await
            }
            MediaTarget::Avatar { user_id } => {
                self.store.upsert_avatar_file(user_id, &relative).await
            }
        };

        if let Err(err) = recorded {
            if !existed {
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    warn!("failed to remove unrecorded file {}: {remove}", path.display());
                }
            }
            return Err(err.into());
        }

        Ok(MediaOutcome::Saved(relative))
    }

    /// Removes every file this fetcher created, along with temp files left by
    /// cancelled downloads. Files that existed before the run are kept.
    /// Returns how many files were removed.
    pub async fn discard_written(&self) -> usize {
        let WrittenFiles { saved, staged } = std::mem::take(&mut *self.written.lock());

        let mut removed = 0;
        for path in saved.iter().chain(staged.iter()) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!("failed to remove {}: {err}", path.display()),
            }
        }
        if removed > 0 {
            info!("removed {removed} media files written by this run");
        }
        removed
    }

    async fn write_atomically(&self, path: &Path, data: &[u8]) -> Result<(), MediaError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{name}.{}.part", Uuid::new_v4()));
        self.written.lock().staged.insert(temp.clone());

        let written = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp, path).await
        }
        .await;

        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            self.written.lock().staged.remove(&temp);
            return Err(io_error(path)(source));
        }
        self.written.lock().staged.remove(&temp);
        Ok(())
    }
}

/// Sets the `size` query parameter of an avatar URL. An empty `size` or an
/// unparseable URL leaves it untouched.
pub fn with_avatar_size(url: &str, size: &str) -> String {
    if size.is_empty() {
        return url.to_string();
    }
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != "size")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("size", size);
    parsed.to_string()
}

fn sanitize_filename(filename: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(filename, "_");
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.into_owned()
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> MediaError {
    let path = path.display().to_string();
    move |source| MediaError::Io { path, source }
}
