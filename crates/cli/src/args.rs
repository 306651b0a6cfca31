//! Command-line argument structures.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "revflow")]
#[command(version)]
#[command(about = "Operate the moderated revision store", long_about = None)]
pub struct Cli {
    /// Registry file (JSON array of record type specs). Defaults to `REVFLOW_REGISTRY`.
    #[arg(short, long, global = true)]
    pub registry: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// List versions awaiting moderation
    Pending,

    /// List recoverable versions of a deleted record type
    Deleted {
        record_type: String,
    },

    /// Show the version history of one record
    History {
        record_type: String,
        record_id: String,
    },

    /// Approve or reject a pending version
    Moderate {
        version_id: i64,

        #[arg(value_enum)]
        decision: Decision,

        /// Id of the acting user
        #[arg(long)]
        actor: i64,

        /// Groups the acting user belongs to
        #[arg(long = "group")]
        groups: Vec<i64>,
    },

    /// Restore live records to a revision's state
    Revert {
        revision_id: i64,

        /// Delete records versioned in this revision but absent from the target
        #[arg(long)]
        previous: Option<i64>,

        /// Remove reachable records that are not part of the target
        #[arg(long)]
        purge: bool,
    },

    /// Validate the nested-interval index of every revision tree
    CheckTree,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Decision {
    Approve,
    Reject,
}
