mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{commands, Cli, Commands};
use gallery_syncd::Gallery;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let gallery = Gallery::open_default()?;

    match cli.command {
        Commands::Login { server, username } => {
            commands::login(&gallery, server, username, cli.json).await?;
        }
        Commands::Logout => commands::logout(&gallery, cli.json)?,
        Commands::Status => commands::status(&gallery, cli.json)?,
        Commands::Sync { album } => {
            commands::sync(&gallery, album.as_deref(), cli.json).await?;
        }
        Commands::Upload { album } => {
            commands::upload(&gallery, album.as_deref(), cli.json).await?;
        }
        Commands::Checksums { album } => {
            commands::checksums(&gallery, album.as_deref(), cli.json).await?;
        }
        Commands::People => commands::people(&gallery, cli.json).await?,
        Commands::Search {
            query,
            page,
            page_size,
        } => {
            commands::search(&gallery, &query, page, page_size, cli.json).await?;
        }
        Commands::Cluster {
            id,
            faces,
            page,
            page_size,
        } => {
            commands::cluster(&gallery, &id, faces, page, page_size, cli.json).await?;
        }
        Commands::Media { id } => commands::media(&gallery, &id, cli.json).await?,
    }

    Ok(())
}
