use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{ArchiveOptions, DuplicatePolicy};
use crate::db::{ArchiveStore, SchemaFeatures};
use crate::discord::{ChannelSnapshot, DiscordMessage, Session};
use crate::media::{MediaFetcher, MediaJob};

pub mod error;
pub mod nickname;
pub mod pagination;
pub mod resume;
pub mod stats;

pub use self::error::ArchiveError;
pub use self::nickname::NicknameCache;
pub use self::pagination::{ChannelHistory, GuildRoster, PageSource, PageWalker, StopReason};
pub use self::resume::locate_resume_cursor;
pub use self::stats::{ArchiveStats, StatsSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel_id: String,
    pub guild_id: String,
    pub archived: usize,
    pub duplicates: usize,
    pub stop: StopReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildOutcome {
    pub guild_id: String,
    pub channels: Vec<ChannelOutcome>,
    /// Text channels whose archive failed and was abandoned.
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberOutcome {
    pub guild_id: String,
    pub archived: usize,
    pub stop: StopReason,
}

/// Drives channel, guild and member archives for one run.
///
/// Pages are read and persisted on the caller's task; media downloads are
/// handed to background tasks as permits become available. Call
/// [`Archiver::finish`] before committing so every download has landed, or
/// [`Archiver::abort`] before rolling back.
pub struct Archiver {
    session: Arc<dyn Session>,
    store: Arc<dyn ArchiveStore>,
    media: Arc<MediaFetcher>,
    nicknames: NicknameCache,
    tasks: JoinSet<()>,
    stats: Arc<ArchiveStats>,
}

impl Archiver {
    pub fn new(
        session: Arc<dyn Session>,
        store: Arc<dyn ArchiveStore>,
        media: Arc<MediaFetcher>,
    ) -> Self {
        let stats = media.stats().clone();
        Self {
            session,
            store,
            media,
            nicknames: NicknameCache::default(),
            tasks: JoinSet::new(),
            stats,
        }
    }

    pub async fn archive_channel(
        &mut self,
        channel_id: &str,
        options: &ArchiveOptions,
    ) -> Result<ChannelOutcome, ArchiveError> {
        self.store
            .ensure_schema(SchemaFeatures {
                files: options.save_attachments || options.save_embed_images,
                ..SchemaFeatures::default()
            })
            .await?;

        let channel = self.session.channel(channel_id).await?;
        self.store.upsert_channel(&channel).await?;
        let guild = self.session.guild(&channel.guild_id).await?;
        self.store.upsert_guild(&guild).await?;

        info!(channel_id, guild_id = %channel.guild_id, "archiving #{}", channel.name);
        self.archive_history(&channel, options).await
    }

    /// Archives every text channel of the guild in turn. A channel that fails
    /// is logged and skipped.
    pub async fn archive_guild(
        &mut self,
        guild_id: &str,
        options: &ArchiveOptions,
    ) -> Result<GuildOutcome, ArchiveError> {
        let channels = self.session.guild_channels(guild_id).await?;

        let mut outcome = GuildOutcome {
            guild_id: guild_id.to_string(),
            channels: Vec::new(),
            failed: Vec::new(),
        };
        for channel in channels.iter().filter(|channel| channel.is_text()) {
            match self.archive_channel(&channel.id, options).await {
                Ok(channel_outcome) => outcome.channels.push(channel_outcome),
                Err(err) => {
                    error!(guild_id, channel_id = %channel.id, "failed to archive channel: {err}");
                    outcome.failed.push(channel.id.clone());
                }
            }
        }
        Ok(outcome)
    }

    pub async fn archive_members(
        &mut self,
        guild_id: &str,
        options: &ArchiveOptions,
    ) -> Result<MemberOutcome, ArchiveError> {
        self.store
            .ensure_schema(SchemaFeatures {
                avatars: options.save_avatars,
                members: true,
                ..SchemaFeatures::default()
            })
            .await?;

        let session = self.session.clone();
        let source = GuildRoster::new(session.as_ref(), guild_id);
        let cursor = resume_cursor(&source, options).await?;
        let mut walker = PageWalker::new(source, cursor, options.limit());

        let mut archived = 0;
        while let Some(batch) = walker.next_batch().await? {
            walker.consume(batch.len());
            for member in batch {
                self.store.upsert_member(&member).await?;
                self.stats.member_archived();
                self.store.upsert_user(&member.user).await?;
                self.stats.user_archived();
                archived += 1;

                if options.save_avatars {
                    if let Some(url) = member.user.avatar_url.as_deref() {
                        let job = MediaJob::avatar(&member.user.id, url, &options.avatar_size);
                        self.dispatch(job).await;
                    }
                }
            }
        }

        let stop = walker.stop_reason().unwrap_or(StopReason::Exhausted);
        info!(guild_id, archived, ?stop, "archived members");
        Ok(MemberOutcome {
            guild_id: guild_id.to_string(),
            archived,
            stop,
        })
    }

    /// Waits for every queued download and returns the run's counters.
    pub async fn finish(&mut self) -> StatsSnapshot {
        while let Some(result) = self.tasks.join_next().await {
            log_task_failure(result);
        }
        self.stats.snapshot()
    }

    /// Cancels outstanding downloads and waits for them to stop.
    pub async fn abort(&mut self) {
        if !self.tasks.is_empty() {
            warn!("cancelling {} media downloads", self.tasks.len());
        }
        self.tasks.shutdown().await;
    }

    /// Deletes every file this run wrote. Call after rolling back so no
    /// file outlives its row.
    pub async fn discard_media(&self) -> usize {
        self.media.discard_written().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn archive_history(
        &mut self,
        channel: &ChannelSnapshot,
        options: &ArchiveOptions,
    ) -> Result<ChannelOutcome, ArchiveError> {
        let session = self.session.clone();
        let source = ChannelHistory::new(session.as_ref(), &channel.id);
        let cursor = resume_cursor(&source, options).await?;
        let mut walker = PageWalker::new(source, cursor, options.limit());

        let mut archived = 0;
        let mut duplicates = 0;
        while let Some(batch) = walker.next_batch().await? {
            let before = archived;
            for message in batch {
                let nickname = self
                    .nicknames
                    .resolve(session.as_ref(), &channel.guild_id, &message.author.id)
                    .await;

                match self.store.insert_message(&message, nickname.as_deref()).await {
                    Ok(()) => {
                        archived += 1;
                        self.stats.message_archived();
                    }
                    Err(err)
                        if err.is_not_unique() && options.on_duplicate == DuplicatePolicy::Skip =>
                    {
                        duplicates += 1;
                        self.stats.duplicate_skipped();
                        debug!(message_id = %message.id, "message already archived");
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }

                self.dispatch_message_media(&message, options).await;
            }
            walker.consume(archived - before);
        }

        let stop = walker.stop_reason().unwrap_or(StopReason::Exhausted);
        info!(channel_id = %channel.id, archived, duplicates, ?stop, "archived channel");
        Ok(ChannelOutcome {
            channel_id: channel.id.clone(),
            guild_id: channel.guild_id.clone(),
            archived,
            duplicates,
            stop,
        })
    }

    async fn dispatch_message_media(&mut self, message: &DiscordMessage, options: &ArchiveOptions) {
        if options.save_attachments {
            for (index, attachment) in message.attachments.iter().enumerate() {
                let job = MediaJob::attachment(&message.channel_id, &message.id, index, attachment);
                self.dispatch(job).await;
            }
        }

        if options.save_embed_images {
            for (index, embed) in message.embeds.iter().enumerate() {
                if let Some(url) = embed.image_url() {
                    let job = MediaJob::embed_image(&message.channel_id, &message.id, index, url);
                    self.dispatch(job).await;
                }
                if let Some(url) = embed.thumbnail_url() {
                    let job =
                        MediaJob::embed_thumbnail(&message.channel_id, &message.id, index, url);
                    self.dispatch(job).await;
                }
            }
        }
    }

    /// Queues `job`, waiting only while every permit is taken.
    async fn dispatch(&mut self, job: MediaJob) {
        while let Some(result) = self.tasks.try_join_next() {
            log_task_failure(result);
        }

        let Some(permit) = self.media.acquire().await else {
            warn!(url = %job.url, "media pool closed, skipping download");
            return;
        };
        let media = self.media.clone();
        self.tasks.spawn(async move { media.run(job, permit).await });
    }
}

/// Cursor the main walk starts from: `skip` wins over `last_id`.
async fn resume_cursor<S: PageSource>(
    source: &S,
    options: &ArchiveOptions,
) -> Result<Option<String>, ArchiveError> {
    if options.skip > 0 {
        return locate_resume_cursor(source, options.skip).await;
    }
    Ok((!options.last_id.is_empty()).then(|| options.last_id.clone()))
}

fn log_task_failure(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            error!("media task panicked: {err}");
        }
    }
}
