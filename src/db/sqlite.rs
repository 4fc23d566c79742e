use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use crate::db::schema_sqlite::{avatarfiles, channels, files, guilds, members, messages, users};
use crate::discord::{ChannelSnapshot, DiscordMember, DiscordMessage, DiscordUser, GuildSnapshot};

use super::{
    ArchiveQueries, ArchiveStore, ArchiveTransaction, DatabaseError, SchemaFeatures,
    models::{AvatarFileRow, FileRow, MemberRow, MessageRow, UserRow},
};

const CORE_TABLES: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        channel_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        username TEXT NOT NULL,
        nickname TEXT,
        content TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        embeds_json TEXT NOT NULL,
        attachments_json TEXT NOT NULL,
        UNIQUE (channel_id, message_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS channels (
        channel_id TEXT NOT NULL UNIQUE,
        guild_id TEXT NOT NULL,
        name TEXT NOT NULL,
        topic TEXT,
        kind INTEGER NOT NULL,
        channel_json TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS guilds (
        guild_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        guild_json TEXT NOT NULL
    )
    "#,
];

const FILE_TABLES: [&str; 1] = [r#"
    CREATE TABLE IF NOT EXISTS files (
        channel_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        path TEXT NOT NULL UNIQUE
    )
    "#];

const AVATAR_TABLES: [&str; 1] = [r#"
    CREATE TABLE IF NOT EXISTS avatarfiles (
        user_id TEXT NOT NULL UNIQUE,
        path TEXT NOT NULL UNIQUE
    )
    "#];

const MEMBER_TABLES: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS members (
        guild_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        username TEXT NOT NULL,
        nickname TEXT,
        roles_json TEXT NOT NULL,
        UNIQUE (guild_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL,
        avatar TEXT,
        discriminator TEXT NOT NULL,
        verified INTEGER NOT NULL DEFAULT 0
    )
    "#,
];

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = guilds)]
struct DbGuild {
    guild_id: String,
    name: String,
    guild_json: String,
}

impl DbGuild {
    fn to_snapshot(&self) -> Result<GuildSnapshot, DatabaseError> {
        Ok(serde_json::from_str(&self.guild_json)?)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = channels)]
struct DbChannel {
    channel_id: String,
    guild_id: String,
    name: String,
    topic: Option<String>,
    kind: i32,
    channel_json: String,
}

impl DbChannel {
    fn to_snapshot(&self) -> Result<ChannelSnapshot, DatabaseError> {
        Ok(serde_json::from_str(&self.channel_json)?)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = messages)]
struct DbMessage {
    channel_id: String,
    message_id: String,
    user_id: String,
    username: String,
    nickname: Option<String>,
    content: String,
    timestamp: String,
    embeds_json: String,
    attachments_json: String,
}

impl DbMessage {
    fn to_message_row(&self) -> Result<MessageRow, DatabaseError> {
        Ok(MessageRow {
            channel_id: self.channel_id.clone(),
            message_id: self.message_id.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            content: self.content.clone(),
            timestamp: self.timestamp.clone(),
            embeds: serde_json::from_str(&self.embeds_json)?,
            attachments: serde_json::from_str(&self.attachments_json)?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = members)]
struct DbMember {
    guild_id: String,
    user_id: String,
    username: String,
    nickname: Option<String>,
    roles_json: String,
}

impl DbMember {
    fn to_member_row(&self) -> Result<MemberRow, DatabaseError> {
        Ok(MemberRow {
            guild_id: self.guild_id.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            roles: serde_json::from_str(&self.roles_json)?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
struct DbUser {
    user_id: String,
    username: String,
    avatar: Option<String>,
    discriminator: String,
    verified: bool,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = files)]
struct DbFile {
    channel_id: String,
    message_id: String,
    path: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = avatarfiles)]
struct DbAvatarFile {
    user_id: String,
    path: String,
}

/// [`ArchiveStore`] and [`ArchiveQueries`] over the run's SQLite transaction.
#[derive(Clone)]
pub struct SqliteArchiveStore {
    tx: ArchiveTransaction,
}

impl SqliteArchiveStore {
    pub fn new(tx: ArchiveTransaction) -> Self {
        Self { tx }
    }

    pub fn transaction(&self) -> &ArchiveTransaction {
        &self.tx
    }
}

#[async_trait]
impl ArchiveStore for SqliteArchiveStore {
    async fn ensure_schema(&self, features: SchemaFeatures) -> Result<(), DatabaseError> {
        let mut statements: Vec<&'static str> = CORE_TABLES.to_vec();
        if features.files {
            statements.extend(FILE_TABLES);
        }
        if features.avatars {
            statements.extend(AVATAR_TABLES);
        }
        if features.members {
            statements.extend(MEMBER_TABLES);
        }

        self.tx
            .run(move |conn| {
                for statement in statements {
                    diesel::sql_query(statement)
                        .execute(conn)
                        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
                }
                Ok(())
            })
            .await
    }

    async fn upsert_guild(&self, guild: &GuildSnapshot) -> Result<(), DatabaseError> {
        let record = DbGuild {
            guild_id: guild.id.clone(),
            name: guild.name.clone(),
            guild_json: serde_json::to_string(guild)?,
        };
        self.tx
            .run(move |conn| {
                diesel::replace_into(guilds::table)
                    .values(&record)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn upsert_channel(&self, channel: &ChannelSnapshot) -> Result<(), DatabaseError> {
        let record = DbChannel {
            channel_id: channel.id.clone(),
            guild_id: channel.guild_id.clone(),
            name: channel.name.clone(),
            topic: channel.topic.clone(),
            kind: i32::from(channel.kind),
            channel_json: serde_json::to_string(channel)?,
        };
        self.tx
            .run(move |conn| {
                diesel::replace_into(channels::table)
                    .values(&record)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn insert_message(
        &self,
        message: &DiscordMessage,
        nickname: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let record = DbMessage {
            channel_id: message.channel_id.clone(),
            message_id: message.id.clone(),
            user_id: message.author.id.clone(),
            username: message.author.username.clone(),
            nickname: nickname.map(str::to_string),
            content: message.content.clone(),
            timestamp: message.timestamp.clone(),
            embeds_json: serde_json::to_string(&message.embeds)?,
            attachments_json: serde_json::to_string(&message.attachments)?,
        };
        self.tx
            .run(move |conn| {
                diesel::insert_into(messages::table)
                    .values(&record)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn upsert_member(&self, member: &DiscordMember) -> Result<(), DatabaseError> {
        let record = DbMember {
            guild_id: member.guild_id.clone(),
            user_id: member.user.id.clone(),
            username: member.user.username.clone(),
            nickname: member.nick.clone(),
            roles_json: serde_json::to_string(&member.roles)?,
        };
        self.tx
            .run(move |conn| {
                diesel::replace_into(members::table)
                    .values(&record)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn upsert_user(&self, user: &DiscordUser) -> Result<(), DatabaseError> {
        let record = DbUser {
            user_id: user.id.clone(),
            username: user.username.clone(),
            avatar: user.avatar_url.clone(),
            discriminator: user.discriminator.clone(),
            verified: user.verified,
        };
        self.tx
            .run(move |conn| {
                diesel::replace_into(users::table)
                    .values(&record)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn insert_file(
        &self,
        channel_id: &str,
        message_id: &str,
        path: &str,
    ) -> Result<(), DatabaseError> {
        let record = DbFile {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            path: path.to_string(),
        };
        self.tx
            .run(move |conn| {
                diesel::insert_into(files::table)
                    .values(&record)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn upsert_avatar_file(&self, user_id: &str, path: &str) -> Result<(), DatabaseError> {
        let record = DbAvatarFile {
            user_id: user_id.to_string(),
            path: path.to_string(),
        };
        self.tx
            .run(move |conn| {
                diesel::replace_into(avatarfiles::table)
                    .values(&record)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl ArchiveQueries for SqliteArchiveStore {
    async fn count_messages(&self, channel_id: &str) -> Result<i64, DatabaseError> {
        let channel_id = channel_id.to_string();
        self.tx
            .run(move |conn| {
                Ok(messages::table
                    .filter(messages::channel_id.eq(channel_id))
                    .count()
                    .get_result(conn)?)
            })
            .await
    }

    async fn channel_messages(
        &self,
        channel_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<MessageRow>, DatabaseError> {
        let channel_id = channel_id.to_string();
        self.tx
            .run(move |conn| {
                let mut query = messages::table
                    .filter(messages::channel_id.eq(channel_id))
                    .order(sql::<BigInt>("CAST(message_id AS INTEGER)"))
                    .select(DbMessage::as_select())
                    .into_boxed();
                if limit > 0 {
                    query = query.limit(limit);
                }
                if offset > 0 {
                    query = query.offset(offset);
                }

                let rows = query.load::<DbMessage>(conn)?;
                rows.iter().map(DbMessage::to_message_row).collect()
            })
            .await
    }

    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelSnapshot>, DatabaseError> {
        let channel_id = channel_id.to_string();
        self.tx
            .run(move |conn| {
                channels::table
                    .filter(channels::channel_id.eq(channel_id))
                    .select(DbChannel::as_select())
                    .first::<DbChannel>(conn)
                    .optional()?
                    .map(|c| c.to_snapshot())
                    .transpose()
            })
            .await
    }

    async fn channels(&self, guild_id: &str) -> Result<Vec<ChannelSnapshot>, DatabaseError> {
        let guild_id = guild_id.to_string();
        self.tx
            .run(move |conn| {
                let rows = channels::table
                    .filter(channels::guild_id.eq(guild_id))
                    .select(DbChannel::as_select())
                    .load::<DbChannel>(conn)?;
                rows.iter().map(DbChannel::to_snapshot).collect()
            })
            .await
    }

    async fn guild(&self, guild_id: &str) -> Result<Option<GuildSnapshot>, DatabaseError> {
        let guild_id = guild_id.to_string();
        self.tx
            .run(move |conn| {
                guilds::table
                    .filter(guilds::guild_id.eq(guild_id))
                    .select(DbGuild::as_select())
                    .first::<DbGuild>(conn)
                    .optional()?
                    .map(|g| g.to_snapshot())
                    .transpose()
            })
            .await
    }

    async fn guilds(&self) -> Result<Vec<GuildSnapshot>, DatabaseError> {
        self.tx
            .run(move |conn| {
                let rows = guilds::table
                    .select(DbGuild::as_select())
                    .load::<DbGuild>(conn)?;
                rows.iter().map(DbGuild::to_snapshot).collect()
            })
            .await
    }

    async fn member(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRow>, DatabaseError> {
        let guild_id = guild_id.to_string();
        let user_id = user_id.to_string();
        self.tx
            .run(move |conn| {
                members::table
                    .filter(members::guild_id.eq(guild_id))
                    .filter(members::user_id.eq(user_id))
                    .select(DbMember::as_select())
                    .first::<DbMember>(conn)
                    .optional()?
                    .map(|m| m.to_member_row())
                    .transpose()
            })
            .await
    }

    async fn count_members(&self, guild_id: &str) -> Result<i64, DatabaseError> {
        let guild_id = guild_id.to_string();
        self.tx
            .run(move |conn| {
                Ok(members::table
                    .filter(members::guild_id.eq(guild_id))
                    .count()
                    .get_result(conn)?)
            })
            .await
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserRow>, DatabaseError> {
        let user_id = user_id.to_string();
        self.tx
            .run(move |conn| {
                let user = users::table
                    .filter(users::user_id.eq(user_id))
                    .select(DbUser::as_select())
                    .first::<DbUser>(conn)
                    .optional()?;
                Ok(user.map(|u| UserRow {
                    user_id: u.user_id,
                    username: u.username,
                    avatar: u.avatar,
                    discriminator: u.discriminator,
                    verified: u.verified,
                }))
            })
            .await
    }

    async fn files_for_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Vec<FileRow>, DatabaseError> {
        let channel_id = channel_id.to_string();
        let message_id = message_id.to_string();
        self.tx
            .run(move |conn| {
                let rows = files::table
                    .filter(files::channel_id.eq(channel_id))
                    .filter(files::message_id.eq(message_id))
                    .order(files::path.asc())
                    .select(DbFile::as_select())
                    .load::<DbFile>(conn)?;
                Ok(rows
                    .into_iter()
                    .map(|f| FileRow {
                        channel_id: f.channel_id,
                        message_id: f.message_id,
                        path: f.path,
                    })
                    .collect())
            })
            .await
    }

    async fn avatar_file(&self, user_id: &str) -> Result<Option<AvatarFileRow>, DatabaseError> {
        let user_id = user_id.to_string();
        self.tx
            .run(move |conn| {
                let row = avatarfiles::table
                    .filter(avatarfiles::user_id.eq(user_id))
                    .select(DbAvatarFile::as_select())
                    .first::<DbAvatarFile>(conn)
                    .optional()?;
                Ok(row.map(|a| AvatarFileRow {
                    user_id: a.user_id,
                    path: a.path,
                }))
            })
            .await
    }
}
