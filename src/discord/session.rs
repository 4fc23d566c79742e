use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serenity::all::{
    Attachment, ChannelId, Embed, GuildChannel, GuildId, Http, Member, Message, MessageId,
    PartialGuild, User, UserId,
};
use serenity::http::MessagePagination;
use tracing::debug;

use super::{
    ChannelSnapshot, DiscordAttachment, DiscordEmbed, DiscordMember, DiscordMessage, DiscordUser,
    GuildSnapshot, MAX_MEMBERS_PER_PAGE, MAX_MESSAGES_PER_PAGE, SNAPSHOT_VERSION, Session,
    SessionError,
};

/// `Session` backed by the Discord REST API.
///
/// Every member the session sees, through a member page or a single lookup,
/// is kept in an in-memory state so later nickname lookups can be answered
/// without another request.
pub struct DiscordSession {
    http: Arc<Http>,
    members: RwLock<HashMap<(String, String), DiscordMember>>,
}

impl DiscordSession {
    pub fn new(token: &SecretString) -> Self {
        Self::from_http(Arc::new(Http::new(token.expose_secret())))
    }

    pub fn from_http(http: Arc<Http>) -> Self {
        Self {
            http,
            members: RwLock::new(HashMap::new()),
        }
    }

    fn remember(&self, member: &DiscordMember) {
        self.members.write().insert(
            (member.guild_id.clone(), member.user.id.clone()),
            member.clone(),
        );
    }
}

#[async_trait]
impl Session for DiscordSession {
    async fn channel(&self, channel_id: &str) -> Result<ChannelSnapshot, SessionError> {
        let id = ChannelId::new(parse_id("channel", channel_id)?);
        let channel = self.http.get_channel(id).await.map_err(http_error)?;
        let channel = channel
            .guild()
            .ok_or_else(|| SessionError::NotGuildChannel(channel_id.to_string()))?;
        Ok(channel_snapshot(&channel))
    }

    async fn guild(&self, guild_id: &str) -> Result<GuildSnapshot, SessionError> {
        let id = GuildId::new(parse_id("guild", guild_id)?);
        let guild = self.http.get_guild(id).await.map_err(http_error)?;
        Ok(guild_snapshot(&guild))
    }

    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<ChannelSnapshot>, SessionError> {
        let id = GuildId::new(parse_id("guild", guild_id)?);
        let channels = self.http.get_channels(id).await.map_err(http_error)?;
        Ok(channels.iter().map(channel_snapshot).collect())
    }

    async fn channel_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<DiscordMessage>, SessionError> {
        let id = ChannelId::new(parse_id("channel", channel_id)?);
        let target = match before {
            Some(before) => Some(MessagePagination::Before(MessageId::new(parse_id(
                "message", before,
            )?))),
            None => None,
        };
        let limit = limit.clamp(1, MAX_MESSAGES_PER_PAGE) as u8;

        let messages = self
            .http
            .get_messages(id, target, Some(limit))
            .await
            .map_err(http_error)?;
        debug!(
            "fetched {} messages from channel {} before {:?}",
            messages.len(),
            channel_id,
            before
        );
        Ok(messages.iter().map(message_record).collect())
    }

    async fn guild_members(
        &self,
        guild_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DiscordMember>, SessionError> {
        let id = GuildId::new(parse_id("guild", guild_id)?);
        let after = after.map(|after| parse_id("user", after)).transpose()?;
        let limit = limit.clamp(1, MAX_MEMBERS_PER_PAGE) as u64;

        let members = self
            .http
            .get_guild_members(id, Some(limit), after)
            .await
            .map_err(http_error)?;

        let members: Vec<DiscordMember> = members
            .iter()
            .map(|member| member_record(guild_id, member))
            .collect();
        for member in &members {
            self.remember(member);
        }
        Ok(members)
    }

    fn cached_member(&self, guild_id: &str, user_id: &str) -> Option<DiscordMember> {
        self.members
            .read()
            .get(&(guild_id.to_string(), user_id.to_string()))
            .cloned()
    }

    async fn guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<DiscordMember, SessionError> {
        let guild = GuildId::new(parse_id("guild", guild_id)?);
        let user = UserId::new(parse_id("user", user_id)?);
        let member = self.http.get_member(guild, user).await.map_err(http_error)?;

        let member = member_record(guild_id, &member);
        self.remember(&member);
        Ok(member)
    }
}

fn parse_id(kind: &'static str, value: &str) -> Result<u64, SessionError> {
    match value.parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(SessionError::InvalidId {
            kind,
            value: value.to_string(),
        }),
    }
}

fn http_error(err: serenity::Error) -> SessionError {
    SessionError::Http(err.to_string())
}

fn guild_snapshot(guild: &PartialGuild) -> GuildSnapshot {
    GuildSnapshot {
        version: SNAPSHOT_VERSION,
        id: guild.id.to_string(),
        name: guild.name.clone(),
        icon_url: guild.icon_url(),
        owner_id: Some(guild.owner_id.to_string()),
        description: guild.description.clone(),
        captured_at: Utc::now(),
    }
}

fn channel_snapshot(channel: &GuildChannel) -> ChannelSnapshot {
    ChannelSnapshot {
        version: SNAPSHOT_VERSION,
        id: channel.id.to_string(),
        guild_id: channel.guild_id.to_string(),
        name: channel.name.clone(),
        topic: channel.topic.clone(),
        kind: u8::from(channel.kind),
        position: channel.position,
        nsfw: channel.nsfw,
        parent_id: channel.parent_id.map(|id| id.to_string()),
        captured_at: Utc::now(),
    }
}

fn user_record(user: &User) -> DiscordUser {
    DiscordUser {
        id: user.id.to_string(),
        username: user.name.clone(),
        discriminator: user
            .discriminator
            .map(|d| format!("{:04}", d.get()))
            .unwrap_or_default(),
        avatar_url: user.avatar_url(),
        verified: false,
        bot: user.bot,
    }
}

fn member_record(guild_id: &str, member: &Member) -> DiscordMember {
    DiscordMember {
        guild_id: guild_id.to_string(),
        user: user_record(&member.user),
        nick: member.nick.clone(),
        roles: member.roles.iter().map(|role| role.to_string()).collect(),
    }
}

fn attachment_record(attachment: &Attachment) -> DiscordAttachment {
    DiscordAttachment {
        id: attachment.id.to_string(),
        filename: attachment.filename.clone(),
        url: attachment.url.clone(),
        size: u64::from(attachment.size),
        content_type: attachment.content_type.clone(),
    }
}

fn embed_record(embed: &Embed) -> DiscordEmbed {
    DiscordEmbed {
        title: embed.title.clone(),
        description: embed.description.clone(),
        url: embed.url.clone(),
        image_url: embed.image.as_ref().map(|image| image.url.clone()),
        thumbnail_url: embed.thumbnail.as_ref().map(|thumb| thumb.url.clone()),
    }
}

fn message_record(message: &Message) -> DiscordMessage {
    DiscordMessage {
        id: message.id.to_string(),
        channel_id: message.channel_id.to_string(),
        author: user_record(&message.author),
        content: message.content.clone(),
        timestamp: message.timestamp.to_string(),
        attachments: message.attachments.iter().map(attachment_record).collect(),
        embeds: message.embeds.iter().map(embed_record).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_id;
    use crate::discord::SessionError;

    #[test]
    fn parse_id_accepts_snowflakes() {
        assert_eq!(parse_id("channel", "81384788765712384").unwrap(), 81384788765712384);
    }

    #[test]
    fn parse_id_rejects_zero_and_garbage() {
        assert!(matches!(
            parse_id("channel", "0"),
            Err(SessionError::InvalidId { kind: "channel", .. })
        ));
        assert!(matches!(
            parse_id("user", "not-an-id"),
            Err(SessionError::InvalidId { kind: "user", .. })
        ));
    }
}
