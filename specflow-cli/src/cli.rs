use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "SpecFlow requirements tracker")]
pub struct Cli {
    /// Path to the config file (defaults to SPECFLOW_CONFIG or the platform config dir)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the data file; `:memory:` keeps everything in memory
    #[clap(long, global = true)]
    pub db: Option<PathBuf>,

    /// Use a zero-latency channel that never fails or drifts
    #[clap(long, global = true)]
    pub reliable: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Print the path to the data file
    Path,

    /// Copy all tables into another data file
    Migrate {
        /// Destination data file; its extension selects the backend
        to: PathBuf,
    },

    /// Dump all tables as a JSON snapshot
    Export {
        /// Output file path
        #[clap(long, short = 'o')]
        output: PathBuf,
    },

    /// Load tables from a JSON snapshot, replacing existing entries
    Import {
        /// Snapshot file path
        input: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all requirements
    List {
        /// Filter by status (exact match)
        #[clap(long)]
        status: Option<String>,
    },

    /// Show details for a specific requirement
    Show {
        /// The ID of the requirement to show
        id: String,
    },

    /// Add a new requirement
    Add {
        /// Title of the requirement
        #[clap(long)]
        title: Option<String>,

        /// Description of the requirement
        #[clap(long)]
        description: Option<String>,

        /// Status of the requirement (Draft, In Progress, Completed)
        #[clap(long)]
        status: Option<String>,

        /// Use interactive mode (prompts)
        #[clap(long)]
        interactive: bool,
    },

    /// Edit an existing requirement
    Edit {
        /// The ID of the requirement to edit
        id: String,

        /// New title
        #[clap(long)]
        title: Option<String>,

        /// New description
        #[clap(long)]
        description: Option<String>,

        /// New status
        #[clap(long)]
        status: Option<String>,
    },

    /// Delete a requirement
    Del {
        /// The ID of the requirement to delete
        id: String,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Generate acceptance criteria for a requirement
    Criteria {
        /// The ID of the requirement
        id: String,
    },

    /// Show the version history of a requirement
    History {
        /// The ID of the requirement
        id: String,
    },

    /// Snapshot a requirement's current title and description
    Commit {
        /// The ID of the requirement
        id: String,
    },

    /// Restore a requirement from its version history
    Restore {
        /// The ID of the requirement
        id: String,

        /// Version id to restore (defaults to the latest)
        #[clap(long)]
        version: Option<String>,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Edit a requirement in a session that autosaves after a quiet period
    Session {
        /// The ID of the requirement to open
        id: String,
    },

    /// Restore the seed requirements and clear all version history
    Reset {
        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Data file management commands
    #[clap(subcommand)]
    Db(DbCommand),
}
