#![forbid(unsafe_code)]
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use tracing::{error, info};

mod archiver;
mod cli;
mod config;
mod db;
mod discord;
mod media;
mod utils;

#[cfg(test)]
mod test_support;

use archiver::{ArchiveStats, Archiver};
use cli::Cli;
use config::{ArchiveOptions, Config};
use db::DatabaseManager;
use db::sqlite::SqliteArchiveStore;
use discord::DiscordSession;
use media::{HttpDownloader, MediaFetcher};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    utils::logging::init_tracing(&config.logging)?;

    if config.discord.token.is_empty() {
        bail!("a bot token is required, pass --token or set DISCORD_ARCHIVE_TOKEN");
    }

    let save_path = PathBuf::from(&config.archive.save_path);
    tokio::fs::create_dir_all(&save_path)
        .await
        .with_context(|| format!("failed to create {}", save_path.display()))?;

    let db_manager = DatabaseManager::new(&config.database, &save_path);
    let tx = db_manager.begin().await?;
    let store = Arc::new(SqliteArchiveStore::new(tx.clone()));

    let session = Arc::new(DiscordSession::new(&config.discord.secret_token()));
    let downloader = Arc::new(HttpDownloader::new(config.media.request_timeout())?);
    let media = Arc::new(MediaFetcher::new(
        downloader,
        store.clone(),
        &save_path,
        config.media.concurrency,
        Arc::new(ArchiveStats::default()),
    ));
    let mut archiver = Archiver::new(session, store, media);

    info!("discord archive starting, writing to {}", save_path.display());

    let result = tokio::select! {
        result = async {
            run(&mut archiver, &cli, &config.archive).await?;
            Ok::<_, anyhow::Error>(archiver.finish().await)
        } => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
    };

    match result {
        Ok(stats) => {
            if let Err(err) = tx.commit().await {
                archiver.discard_media().await;
                return Err(err.into());
            }
            info!("archive committed: {stats}");
            Ok(())
        }
        Err(err) => {
            archiver.abort().await;
            if let Err(rollback) = tx.rollback().await {
                error!("rollback failed: {rollback}");
            }
            archiver.discard_media().await;
            info!("archive rolled back");
            Err(err)
        }
    }
}

async fn run(archiver: &mut Archiver, cli: &Cli, options: &ArchiveOptions) -> Result<()> {
    let member_options = options.for_members();
    let mut member_guilds = HashSet::new();

    for target in &cli.targets {
        let guild_id = if cli.guild {
            let outcome = archiver.archive_guild(target, options).await?;
            info!(
                guild_id = %target,
                channels = outcome.channels.len(),
                failed = outcome.failed.len(),
                "archived guild"
            );
            target.clone()
        } else {
            archiver.archive_channel(target, options).await?.guild_id
        };

        if cli.archives_members() && member_guilds.insert(guild_id.clone()) {
            archiver.archive_members(&guild_id, &member_options).await?;
        }
    }
    Ok(())
}
