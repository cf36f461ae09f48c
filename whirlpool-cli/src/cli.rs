use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (TOML). Defaults to `<config dir>/whirlpool/config.toml`
    /// when present, otherwise `WHIRLPOOL_*` environment variables are used.
    #[arg(short, long, env = "WHIRLPOOL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Also write daily-rotated log files to this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print compact JSON instead of pretty JSON
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage catalog sources
    #[command(subcommand)]
    Sources(SourceCommand),

    /// Show the active source's status
    Status {
        /// Bypass the status cache
        #[arg(long)]
        refresh: bool,
    },

    /// List channels of the active source
    Channels,

    /// Show or change a channel's filter selection
    Filters {
        channel: String,

        /// Select choices, as `option=choice[,choice...]`. An empty list
        /// (`option=`) clears a multi-select option.
        #[arg(long = "set", value_name = "OPTION=CHOICES")]
        set: Vec<String>,

        /// Forget the stored selection
        #[arg(long, conflicts_with = "set")]
        clear: bool,
    },

    /// List a page of a channel
    Videos {
        channel: String,

        #[arg(short, long, default_value = "")]
        query: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        per_page: u32,
    },

    /// Resolve a page URL to a playable stream
    Resolve {
        url: String,

        #[command(flatten)]
        item: ItemArgs,
    },

    /// Download an item for offline playback
    Download {
        url: String,

        #[command(flatten)]
        item: ItemArgs,
    },

    /// Manage downloaded items
    #[command(subcommand)]
    Downloads(DownloadCommand),

    /// Manage favorites
    #[command(subcommand)]
    Favorites(FavoriteCommand),

    /// Read and write settings
    #[command(subcommand)]
    Settings(SettingCommand),

    /// Watch and search history
    #[command(subcommand)]
    History(HistoryCommand),

    /// Copy the database to a file
    Export { path: PathBuf },

    /// Replace the database with the contents of a file
    Import { path: PathBuf },

    /// Clear persisted data
    #[command(subcommand)]
    Maintenance(MaintenanceCommand),

    /// Check for or install extractor updates
    Update {
        /// Run the extractor's self-update instead of only checking
        #[arg(long)]
        run: bool,

        /// Print the last recorded check without contacting the network
        #[arg(long, conflicts_with = "run")]
        stored: bool,
    },

    /// Show engine health
    Health,
}

#[derive(clap::Args, Debug)]
pub struct ItemArgs {
    #[arg(long)]
    pub channel: Option<String>,

    #[arg(long)]
    pub video: Option<String>,

    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum SourceCommand {
    /// Add a source by host or URL and make it active
    Add { url: String },
    Remove { url: String },
    List,
    /// Make a configured source the active one
    Use { url: String },
    Active,
}

#[derive(Subcommand, Debug)]
pub enum DownloadCommand {
    List,
    Remove { channel: String, video: String },
}

#[derive(Subcommand, Debug)]
pub enum FavoriteCommand {
    List,
    Add {
        id: String,
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        channel: Option<String>,
    },
    Remove { id: String },
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum SettingCommand {
    Get { key: String },
    Set { key: String, value: String },
    Remove { key: String },
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    Watch {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    Search {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum MaintenanceCommand {
    ClearCache,
    ClearAchievements,
    /// Drop and recreate every table
    ResetAll {
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_filters() {
        let args = Args::parse_from([
            "whirlpool", "filters", "news", "--set", "sort=top", "--set", "tags=a,b",
        ]);
        match args.command {
            Commands::Filters { channel, set, clear } => {
                assert_eq!(channel, "news");
                assert_eq!(set, vec!["sort=top", "tags=a,b"]);
                assert!(!clear);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
