use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "hims-sync")]
#[command(about = "Inspect and operate the offline sync queue of a hospital site")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the sync database file
    #[arg(long, global = true, value_name = "PATH", env = "HIMS_SYNC_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Acting user recorded on pushes and resolutions
    #[arg(long, global = true, value_name = "USER", env = "HIMS_SYNC_USER")]
    pub user: Option<String>,

    /// Facility the command applies to
    #[arg(long, global = true, value_name = "ID", env = "HIMS_SYNC_FACILITY")]
    pub facility: Option<String>,

    /// Client device the command applies to
    #[arg(long, global = true, value_name = "ID", env = "HIMS_SYNC_CLIENT")]
    pub client: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show queue health for a client device
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List pending conflicts of a facility
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a pending conflict
    Resolve {
        /// Conflict ID
        id: String,
        /// Decision to apply
        #[arg(long, value_enum)]
        resolution: ResolutionArg,
        /// Resolved payload as inline JSON (merged/manual)
        #[arg(long, value_name = "JSON", conflicts_with = "payload_file")]
        payload: Option<String>,
        /// Resolved payload read from a JSON file (merged/manual)
        #[arg(long, value_name = "PATH")]
        payload_file: Option<PathBuf>,
        /// Free-text resolution notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset failed changes of a client to pending
    RetryFailed,
    /// Run pending changes of a client through reconciliation again
    Reprocess {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show server changes after a checkpoint
    Pull {
        /// Exclusive checkpoint (Unix ms)
        #[arg(long, default_value = "0")]
        since: i64,
        /// Restrict to these entity types
        #[arg(long = "entity-type", value_name = "KIND")]
        entity_types: Vec<String>,
        /// Page size
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ingest a push batch from a JSON file
    Push {
        /// Path to the push batch
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered entity types
    Entities {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolutionArg {
    ClientWins,
    ServerWins,
    Merged,
    Manual,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
