use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "media-organizer")]
#[command(about = "Migrate media collections into an organized, deduplicated tree", long_about = None)]
pub struct Cli {
    /// SQLite database holding run state
    #[arg(long, default_value = "media_organizer.db", global = true)]
    pub db_path: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new migration run and drive it to completion
    Run(RunArgs),
    /// Resume the given run (or the latest resumable one)
    Resume {
        run_id: Option<i64>,
    },
    /// Undo a run's filesystem effects from its rollback ledger
    Rollback {
        run_id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show a run's phase, counts and recent errors
    Status {
        run_id: i64,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Source tree to migrate
    #[arg(long)]
    pub source: String,

    /// Destination root for the organized tree
    #[arg(long)]
    pub dest: String,

    /// Human-readable run name (defaults to a timestamped one)
    #[arg(long)]
    pub name: Option<String>,

    /// Minimum file size in bytes to migrate
    #[arg(long)]
    pub min_size: Option<u64>,

    /// Scan photo files (overrides the config file)
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    pub include_photos: Option<bool>,

    /// Scan video files (overrides the config file)
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    pub include_videos: Option<bool>,

    /// Scan camera raw files (overrides the config file)
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    pub include_raw: Option<bool>,

    /// Scan non-media files into the Other tree (overrides the config file)
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    pub include_other: Option<bool>,

    /// Behavior when a destination path already exists: fail, skip, overwrite
    #[arg(long, default_value = "fail")]
    pub overwrite: String,

    /// Per-item failure handling: halt, skip, retry
    #[arg(long, default_value = "skip")]
    pub on_error: String,

    /// Hard-link duplicates to their primary instead of skipping them
    #[arg(long)]
    pub link_duplicates: bool,

    /// Live-photo handling: pair, independent
    #[arg(long, default_value = "independent")]
    pub live_photos: String,

    /// Thumbnail handling: copy, skip, dedup-separate
    #[arg(long, default_value = "copy")]
    pub thumbs: String,

    /// Cap worker pool at this percentage of available cores
    #[arg(long)]
    pub cpu_limit: Option<u32>,

    /// Cap aggregate copy/hash throughput (MB/s)
    #[arg(long)]
    pub io_limit: Option<u32>,

    /// Plan only; stop before any copy
    #[arg(long)]
    pub dry_run: bool,
}
