use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grabbot")]
#[command(author, version, about = "Telegram bot that fetches media with yt-dlp", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./grab.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot with long polling (default)
    Run,

    /// Download a single URL through the primary/fallback executor
    Fetch {
        /// Media page URL
        url: String,

        /// yt-dlp format id (video) or audio quality such as 128K
        #[arg(short, long, default_value = "best")]
        format: String,

        /// Output container / extension
        #[arg(short, long, default_value = "mp4")]
        container: String,

        /// Extract audio instead of downloading video
        #[arg(long)]
        audio: bool,

        /// Directory to place the file in
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Check external tools and print the effective configuration
    Check,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
