use async_trait::async_trait;

use super::DatabaseError;
use super::models::{AvatarFileRow, FileRow, MemberRow, MessageRow, UserRow};
use crate::discord::{ChannelSnapshot, DiscordMember, DiscordMessage, DiscordUser, GuildSnapshot};

/// Optional table groups created on demand by [`ArchiveStore::ensure_schema`].
///
/// `messages`, `channels` and `guilds` are always created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaFeatures {
    pub files: bool,
    pub avatars: bool,
    pub members: bool,
}

/// Write side of the archive. Every call runs inside the caller's transaction.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn ensure_schema(&self, features: SchemaFeatures) -> Result<(), DatabaseError>;

    async fn upsert_guild(&self, guild: &GuildSnapshot) -> Result<(), DatabaseError>;

    async fn upsert_channel(&self, channel: &ChannelSnapshot) -> Result<(), DatabaseError>;

    /// Fails with [`DatabaseError::NotUnique`] if the message was already archived.
    async fn insert_message(
        &self,
        message: &DiscordMessage,
        nickname: Option<&str>,
    ) -> Result<(), DatabaseError>;

    async fn upsert_member(&self, member: &DiscordMember) -> Result<(), DatabaseError>;

    async fn upsert_user(&self, user: &DiscordUser) -> Result<(), DatabaseError>;

    /// Fails with [`DatabaseError::NotUnique`] if `path` is already recorded.
    async fn insert_file(
        &self,
        channel_id: &str,
        message_id: &str,
        path: &str,
    ) -> Result<(), DatabaseError>;

    async fn upsert_avatar_file(&self, user_id: &str, path: &str) -> Result<(), DatabaseError>;
}

/// Read side of the archive, used by renderers and for verification.
#[async_trait]
pub trait ArchiveQueries: Send + Sync {
    async fn count_messages(&self, channel_id: &str) -> Result<i64, DatabaseError>;

    /// Messages ordered by id; a `limit` of zero returns everything after `offset`.
    async fn channel_messages(
        &self,
        channel_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>, DatabaseError>;

    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelSnapshot>, DatabaseError>;

    async fn channels(&self, guild_id: &str) -> Result<Vec<ChannelSnapshot>, DatabaseError>;

    async fn guild(&self, guild_id: &str) -> Result<Option<GuildSnapshot>, DatabaseError>;

    async fn guilds(&self) -> Result<Vec<GuildSnapshot>, DatabaseError>;

    async fn member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRow>, DatabaseError>;

    async fn count_members(&self, guild_id: &str) -> Result<i64, DatabaseError>;

    async fn user(&self, user_id: &str) -> Result<Option<UserRow>, DatabaseError>;

    async fn files_for_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Vec<FileRow>, DatabaseError>;

    async fn avatar_file(&self, user_id: &str) -> Result<Option<AvatarFileRow>, DatabaseError>;
}
