//! In-memory session and downloader used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::discord::{
    ChannelSnapshot, DiscordAttachment, DiscordEmbed, DiscordMember, DiscordMessage, DiscordUser,
    GuildSnapshot, Session, SessionError,
};
use crate::media::{Downloader, MediaError};

pub const PNG: &[u8] = b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR\x00\x00\x00\x01";
pub const HTML: &[u8] = b"<!DOCTYPE html><html><body>not an image</body></html>";

/// First id handed out by [`history`].
pub const FIRST_MESSAGE_ID: u64 = 1000;

pub fn user(id: &str) -> DiscordUser {
    DiscordUser {
        id: id.to_string(),
        username: format!("user{id}"),
        discriminator: "0001".to_string(),
        avatar_url: None,
        verified: false,
        bot: false,
    }
}

pub fn message(channel_id: &str, id: u64, author_id: &str) -> DiscordMessage {
    DiscordMessage {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        author: user(author_id),
        content: format!("message {id}"),
        timestamp: "2024-03-01T12:00:00+00:00".to_string(),
        attachments: Vec::new(),
        embeds: Vec::new(),
    }
}

/// `count` messages by user `1`, oldest first, with ascending ids.
pub fn history(channel_id: &str, count: usize) -> Vec<DiscordMessage> {
    (0..count as u64)
        .map(|offset| message(channel_id, FIRST_MESSAGE_ID + offset, "1"))
        .collect()
}

pub fn with_attachment(mut message: DiscordMessage, url: &str, filename: &str) -> DiscordMessage {
    message.attachments.push(DiscordAttachment {
        id: format!("{}{}", message.id, message.attachments.len()),
        filename: filename.to_string(),
        url: url.to_string(),
        size: 16,
        content_type: None,
    });
    message
}

pub fn with_embed_image(mut message: DiscordMessage, url: &str) -> DiscordMessage {
    message.embeds.push(DiscordEmbed::image(url));
    message
}

pub fn member(guild_id: &str, user_id: &str, nick: Option<&str>) -> DiscordMember {
    DiscordMember {
        guild_id: guild_id.to_string(),
        user: user(user_id),
        nick: nick.map(str::to_string),
        roles: Vec::new(),
    }
}

fn numeric(id: &str) -> u64 {
    id.parse().unwrap_or_default()
}

#[derive(Default)]
pub struct FakeSession {
    guilds: HashMap<String, GuildSnapshot>,
    channels: HashMap<String, ChannelSnapshot>,
    histories: HashMap<String, Vec<DiscordMessage>>,
    rosters: HashMap<String, Vec<DiscordMember>>,
    cached: HashMap<(String, String), DiscordMember>,
    remote: HashMap<(String, String), DiscordMember>,
    failing_channels: HashSet<String>,
    message_cursors: Mutex<Vec<Option<String>>>,
    member_cursors: Mutex<Vec<Option<String>>>,
    page_sizes: Mutex<Vec<usize>>,
    member_lookups: AtomicUsize,
}

impl FakeSession {
    pub fn with_guild(mut self, guild_id: &str) -> Self {
        self.guilds.insert(
            guild_id.to_string(),
            GuildSnapshot::new(guild_id, format!("guild {guild_id}")),
        );
        self
    }

    pub fn with_channel(mut self, guild_id: &str, channel_id: &str, kind: u8) -> Self {
        self.channels.insert(
            channel_id.to_string(),
            ChannelSnapshot::new(channel_id, guild_id, format!("channel {channel_id}"), kind),
        );
        self
    }

    /// Messages must be given oldest first.
    pub fn with_history(mut self, channel_id: &str, messages: Vec<DiscordMessage>) -> Self {
        self.histories.insert(channel_id.to_string(), messages);
        self
    }

    /// Members must be given in ascending user id order.
    pub fn with_roster(mut self, guild_id: &str, members: Vec<DiscordMember>) -> Self {
        self.rosters.insert(guild_id.to_string(), members);
        self
    }

    pub fn with_cached_member(mut self, member: DiscordMember) -> Self {
        self.cached
            .insert((member.guild_id.clone(), member.user.id.clone()), member);
        self
    }

    pub fn with_remote_member(mut self, member: DiscordMember) -> Self {
        self.remote
            .insert((member.guild_id.clone(), member.user.id.clone()), member);
        self
    }

    pub fn failing_channel(mut self, channel_id: &str) -> Self {
        self.failing_channels.insert(channel_id.to_string());
        self
    }

    pub fn message_cursors(&self) -> Vec<Option<String>> {
        self.message_cursors.lock().clone()
    }

    pub fn member_cursors(&self) -> Vec<Option<String>> {
        self.member_cursors.lock().clone()
    }

    pub fn page_sizes(&self) -> Vec<usize> {
        self.page_sizes.lock().clone()
    }

    pub fn member_lookups(&self) -> usize {
        self.member_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn channel(&self, channel_id: &str) -> Result<ChannelSnapshot, SessionError> {
        self.channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("channel {channel_id}")))
    }

    async fn guild(&self, guild_id: &str) -> Result<GuildSnapshot, SessionError> {
        self.guilds
            .get(guild_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("guild {guild_id}")))
    }

    async fn guild_channels(&self, guild_id: &str) -> Result<Vec<ChannelSnapshot>, SessionError> {
        if !self.guilds.contains_key(guild_id) {
            return Err(SessionError::NotFound(format!("guild {guild_id}")));
        }
        let mut channels: Vec<_> = self
            .channels
            .values()
            .filter(|channel| channel.guild_id == guild_id)
            .cloned()
            .collect();
        channels.sort_by_key(|channel| numeric(&channel.id));
        Ok(channels)
    }

    async fn channel_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<DiscordMessage>, SessionError> {
        self.message_cursors.lock().push(before.map(str::to_string));
        self.page_sizes.lock().push(limit);
        if self.failing_channels.contains(channel_id) {
            return Err(SessionError::Http(format!("channel {channel_id} unavailable")));
        }
        let before = before.map(numeric).unwrap_or(u64::MAX);
        Ok(self
            .histories
            .get(channel_id)
            .map(|messages| {
                messages
                    .iter()
                    .rev()
                    .filter(|message| numeric(&message.id) < before)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn guild_members(
        &self,
        guild_id: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DiscordMember>, SessionError> {
        self.member_cursors.lock().push(after.map(str::to_string));
        self.page_sizes.lock().push(limit);
        let after = after.map(numeric).unwrap_or(0);
        Ok(self
            .rosters
            .get(guild_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|member| numeric(&member.user.id) > after)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn cached_member(&self, guild_id: &str, user_id: &str) -> Option<DiscordMember> {
        self.cached
            .get(&(guild_id.to_string(), user_id.to_string()))
            .cloned()
    }

    async fn guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<DiscordMember, SessionError> {
        self.member_lookups.fetch_add(1, Ordering::SeqCst);
        self.remote
            .get(&(guild_id.to_string(), user_id.to_string()))
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("member {user_id}")))
    }
}

/// Serves scripted bodies by URL; unknown URLs fail with a 404.
#[derive(Default)]
pub struct FakeDownloader {
    bodies: HashMap<String, Vec<u8>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeDownloader {
    pub fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, MediaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self
            .bodies
            .get(url)
            .cloned()
            .ok_or_else(|| MediaError::Status {
                url: url.to_string(),
                status: 404,
            });

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
