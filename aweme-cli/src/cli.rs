use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "aweme",
    about = "Resolve Douyin share links into watermark-free media records and download them",
    version,
    author
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Proxy URL added to the rotation pool (http, https or socks5)
    #[arg(long, global = true)]
    pub proxy: Vec<String>,

    /// File with one proxy URL per line
    #[arg(long, global = true)]
    pub proxy_file: Option<PathBuf>,

    /// Never use the headless-browser strategy
    #[arg(long, global = true)]
    pub no_browser: bool,

    /// Directory for the record cache
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Disable the record cache entirely
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Cookie header string, or @path to a Netscape cookies.txt export
    #[arg(long, global = true)]
    pub cookies: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve one share text, link or aweme ID into a media record
    Parse {
        /// Share text, short link, full URL or bare aweme ID
        input: String,

        /// Re-parse even if a cached record exists
        #[arg(long)]
        force: bool,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,

        /// Save output to file instead of stdout
        #[arg(short = 'O', long)]
        output_file: Option<PathBuf>,
    },

    /// Parse multiple inputs from a file, one per line
    Batch {
        /// Input file with one share text/link/ID per line
        file: PathBuf,

        /// Maximum concurrent parses
        #[arg(long, default_value = "10")]
        max_concurrent: usize,

        /// Output format
        #[arg(short, long, default_value = "json")]
        output: OutputFormat,

        /// Exit successfully even when some inputs fail
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Parse an input and download its media
    Download {
        /// Share text, short link, full URL or bare aweme ID
        input: String,

        /// Output directory
        #[arg(short = 'd', long, default_value = ".")]
        dir: PathBuf,

        /// Also download the cover image
        #[arg(long)]
        with_cover: bool,

        /// Replace files that already exist
        #[arg(long)]
        overwrite: bool,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Show strategy health, cache, proxy and request metrics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: StatsFormat,
    },

    /// Inspect or clear the record cache
    Cache {
        /// Remove every cached record
        #[arg(long)]
        clear: bool,

        /// Show cache statistics
        #[arg(long)]
        stats: bool,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed human-readable output
    #[default]
    Pretty,
    /// JSON output
    Json,
    /// Compact JSON output
    JsonCompact,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatsFormat {
    /// Pretty-printed human-readable output
    #[default]
    Pretty,
    /// JSON output
    Json,
    /// Prometheus text exposition format
    Prometheus,
}
