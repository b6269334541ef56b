// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stackroll")]
#[command(about = "Phase-sequenced cloud stack deployment with automatic rollback")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output for CI
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a stackroll.yml configuration file
    Init {
        /// Provider region written into the template
        #[arg(short, long)]
        region: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy a stack, rolling back automatically on failure
    Deploy {
        /// Stack name
        stack: String,

        /// Deployment type: spot, alb, cdn, or full
        #[arg(short = 't', long = "type", default_value = "spot")]
        deployment_type: String,

        /// Break an existing stack lock
        #[arg(short, long)]
        force: bool,
    },

    /// Roll back a stack on operator request
    Rollback {
        /// Stack name
        stack: String,

        /// Rollback mode: full, partial, incremental, or emergency
        #[arg(short, long, default_value = "full")]
        mode: String,

        /// Reason recorded in the rollback report
        #[arg(short, long, default_value = "manual")]
        reason: String,

        /// Break an existing stack lock
        #[arg(short, long)]
        force: bool,
    },

    /// Show lifecycle state, phases, and resources of a stack
    Status {
        /// Stack name
        stack: String,
    },

    /// Ask a running deployment to abort and roll back
    Abort {
        /// Stack name
        stack: String,
    },

    /// Set a trigger variable for a stack (health, cost, quota signals)
    Signal {
        /// Stack name
        stack: String,

        /// Variable name, e.g. HEALTH_STATUS
        variable: String,

        /// Value, parsed according to the variable's type
        value: String,
    },

    /// Manage state snapshots
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Take a backup snapshot of one stack or the whole document
    Create {
        /// Stack name (all stacks when omitted)
        stack: Option<String>,
    },

    /// List snapshots, newest first
    List {
        /// Only snapshots of this stack
        stack: Option<String>,
    },

    /// Restore resources and variables from a snapshot
    Restore {
        /// Snapshot id
        id: String,

        /// Restore only this stack
        #[arg(short, long)]
        stack: Option<String>,
    },

    /// Delete snapshots older than the retention period
    Cleanup {
        /// Retention in days (defaults to snapshots.retention_days)
        #[arg(long)]
        days: Option<u32>,
    },
}
