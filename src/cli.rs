// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "anodos")]
#[command(about = "Blue/green release orchestration across staged environments")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output (CI)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// JSON-lines output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new anodos.yml configuration file
    Init {
        /// Registry repository, e.g. registry.example.com/acme/app
        #[arg(long)]
        repository: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Promote a commit through its mapped environment
    Promote {
        /// Trigger ref, e.g. refs/heads/main
        #[arg(long = "ref")]
        git_ref: String,

        /// Commit the artifact was (or will be) built from
        #[arg(long)]
        commit: String,

        /// Target environment override (staging, blue, green)
        #[arg(long)]
        env: Option<String>,

        /// Promote an already-pushed tag instead of building
        #[arg(long)]
        tag: Option<String>,
    },

    /// Roll an environment back to a previous tag
    Rollback {
        /// Environment to roll back (staging, blue, green)
        env: String,

        /// Explicit historical tag; defaults to the last attempt's
        /// previous tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Show per-environment deployment state
    Status {
        /// Limit to one environment
        env: Option<String>,
    },

    /// List artifact tag history, newest first
    Tags {
        /// Tag prefix filter, e.g. green-
        #[arg(long, default_value = "")]
        prefix: String,

        /// Maximum entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
