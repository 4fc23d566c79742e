//! Command line flags. Anything given here overrides the configuration file
//! and the environment.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, DuplicatePolicy};

/// Archive Discord channels, guilds and member lists into SQLite.
#[derive(Parser, Debug)]
#[command(name = "discord-archive", version, about)]
pub struct Cli {
    /// Channel ids, or guild ids with --guild
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Treat targets as guilds and archive all their text channels, then
    /// their member lists
    #[arg(short = 'g', long)]
    pub guild: bool,

    /// Also archive the member list of each channel's guild, with avatars
    #[arg(long)]
    pub members: bool,

    /// Folder for the database and downloaded media
    #[arg(short = 'o', long = "out")]
    pub out: Option<PathBuf>,

    /// Download message attachments
    #[arg(long)]
    pub attachments: bool,

    /// Download embed images and thumbnails
    #[arg(long)]
    pub embeds: bool,

    /// Download member avatars
    #[arg(long)]
    pub avatars: bool,

    /// Requested avatar size, a power of two between 16 and 4096
    #[arg(long)]
    pub avatar_size: Option<String>,

    /// Number of newest items to skip before archiving
    #[arg(long)]
    pub skip: Option<usize>,

    /// Maximum items to archive per channel or member list
    #[arg(long)]
    pub limit: Option<usize>,

    /// Start archiving just before this message id
    #[arg(long)]
    pub last_id: Option<String>,

    /// What to do with a message that is already archived
    #[arg(long, value_enum)]
    pub on_duplicate: Option<DuplicatePolicy>,

    /// Bot token
    #[arg(short = 't', long, env = "DISCORD_ARCHIVE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// YAML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `discord_archive=trace`
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Guild archives always include the member list.
    pub fn archives_members(&self) -> bool {
        self.guild || self.members
    }

    pub fn apply(&self, config: &mut Config) {
        let archive = &mut config.archive;

        if let Some(out) = &self.out {
            archive.save_path = out.to_string_lossy().into_owned();
        }
        archive.save_attachments |= self.attachments;
        archive.save_embed_images |= self.embeds;
        archive.save_avatars |= self.avatars;
        if let Some(size) = &self.avatar_size {
            archive.avatar_size = size.clone();
        }
        if let Some(skip) = self.skip {
            archive.skip = skip;
        }
        if let Some(limit) = self.limit {
            archive.limit = limit;
        }
        if let Some(last_id) = &self.last_id {
            archive.last_id = last_id.clone();
        }
        if let Some(policy) = self.on_duplicate {
            archive.on_duplicate = policy;
        }

        if let Some(token) = &self.token {
            config.discord.token = token.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;
    use crate::config::{Config, DuplicatePolicy};

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "discord-archive",
            "-o",
            "/tmp/out",
            "--attachments",
            "--limit",
            "50",
            "--skip",
            "10",
            "--on-duplicate",
            "skip",
            "-t",
            "secret",
            "123",
            "456",
        ])
        .expect("parse");
        let mut config = Config::default();

        cli.apply(&mut config);

        assert_eq!(cli.targets, vec!["123", "456"]);
        assert_eq!(config.archive.save_path, "/tmp/out");
        assert!(config.archive.save_attachments);
        assert!(!config.archive.save_avatars);
        assert_eq!(config.archive.limit(), Some(50));
        assert_eq!(config.archive.skip, 10);
        assert_eq!(config.archive.on_duplicate, DuplicatePolicy::Skip);
        assert_eq!(config.discord.token, "secret");
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let cli = Cli::try_parse_from(["discord-archive", "-g", "--members", "10"]).expect("parse");
        let mut config = Config::default();
        config.archive.save_embed_images = true;
        config.archive.limit = 7;

        cli.apply(&mut config);

        assert!(cli.guild);
        assert!(cli.members);
        assert!(config.archive.save_embed_images);
        assert_eq!(config.archive.limit, 7);
    }

    #[test]
    fn guild_mode_always_archives_members() {
        let guild = Cli::try_parse_from(["discord-archive", "-g", "10"]).expect("parse");
        let channel = Cli::try_parse_from(["discord-archive", "100"]).expect("parse");
        let channel_with_members =
            Cli::try_parse_from(["discord-archive", "--members", "100"]).expect("parse");

        assert!(guild.archives_members());
        assert!(!channel.archives_members());
        assert!(channel_with_members.archives_members());
    }

    #[test]
    fn targets_are_required() {
        assert!(Cli::try_parse_from(["discord-archive"]).is_err());
    }
}
