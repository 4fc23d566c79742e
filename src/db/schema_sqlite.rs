// SQLite schema definitions for the archive tables.
// Primary keys mirror the natural unique keys of each table.

diesel::table! {
    guilds (guild_id) {
        guild_id -> Text,
        name -> Text,
        guild_json -> Text,
    }
}

diesel::table! {
    channels (channel_id) {
        channel_id -> Text,
        guild_id -> Text,
        name -> Text,
        topic -> Nullable<Text>,
        kind -> Integer,
        channel_json -> Text,
    }
}

diesel::table! {
    messages (channel_id, message_id) {
        channel_id -> Text,
        message_id -> Text,
        user_id -> Text,
        username -> Text,
        nickname -> Nullable<Text>,
        content -> Text,
        timestamp -> Text,
        embeds_json -> Text,
        attachments_json -> Text,
    }
}

diesel::table! {
    files (path) {
        channel_id -> Text,
        message_id -> Text,
        path -> Text,
    }
}

diesel::table! {
    avatarfiles (user_id) {
        user_id -> Text,
        path -> Text,
    }
}

diesel::table! {
    members (guild_id, user_id) {
        guild_id -> Text,
        user_id -> Text,
        username -> Text,
        nickname -> Nullable<Text>,
        roles_json -> Text,
    }
}

diesel::table! {
    users (user_id) {
        user_id -> Text,
        username -> Text,
        avatar -> Nullable<Text>,
        discriminator -> Text,
        verified -> Bool,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    guilds,
    channels,
    messages,
    files,
    avatarfiles,
    members,
    users,
);
