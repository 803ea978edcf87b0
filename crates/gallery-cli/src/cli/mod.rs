pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(name = "gallery", about = "Keep local photos and the gallery server in sync")]
#[clap(version, author)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[clap(long, global = true)]
    pub json: bool,

    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in to a gallery server
    #[clap(name = "login")]
    Login {
        /// Server URL (defaults to the configured one)
        #[clap(long)]
        server: Option<String>,
        /// Username (prompted if omitted)
        #[clap(long)]
        username: Option<String>,
    },

    /// Forget the stored session
    #[clap(name = "logout")]
    Logout,

    /// Show login, watermark and cache state
    #[clap(name = "status")]
    Status,

    /// Reconcile local media with the server catalog
    #[clap(name = "sync")]
    Sync {
        /// Only look at one album
        #[clap(long)]
        album: Option<String>,
    },

    /// Upload local files the server does not have yet
    #[clap(name = "upload")]
    Upload {
        /// Only look at one album
        #[clap(long)]
        album: Option<String>,
    },

    /// Fingerprint every local file without a cached checksum
    #[clap(name = "checksums")]
    Checksums {
        /// Only look at one album
        #[clap(long)]
        album: Option<String>,
    },

    /// List known people, then unknown face clusters
    #[clap(name = "people")]
    People,

    /// Search the remote gallery
    #[clap(name = "search")]
    Search {
        /// Free-text query
        query: String,
        #[clap(long, default_value_t = 0)]
        page: u32,
        #[clap(long, default_value_t = 50)]
        page_size: u32,
    },

    /// List previews of a cluster or face
    #[clap(name = "cluster")]
    Cluster {
        /// Cluster or face id
        id: String,
        /// Treat the id as a face cluster
        #[clap(long)]
        faces: bool,
        #[clap(long, default_value_t = 0)]
        page: u32,
        #[clap(long, default_value_t = 50)]
        page_size: u32,
    },

    /// Show the full-resolution URL and metadata of a remote asset
    #[clap(name = "media")]
    Media {
        /// Remote asset id
        id: String,
    },
}
