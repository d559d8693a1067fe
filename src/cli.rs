// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `stackctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stackctl",
    version,
    about = "Deploy and terminate dependent infrastructure stacks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value = "stackctl.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STACKCTL_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Deploy stacks, honouring `depends_on`. Deploys every stack if none are named.
    Deploy {
        /// Stacks to deploy.
        #[arg(value_name = "STACK")]
        stacks: Vec<String>,

        /// Validate and print the deployment plan without touching the backend.
        #[arg(long)]
        dry_run: bool,
    },

    /// Terminate stacks, waiting for their dependents to disappear first.
    Terminate {
        /// Stacks to terminate.
        #[arg(value_name = "STACK")]
        stacks: Vec<String>,

        /// Terminate every configured stack.
        #[arg(long, conflicts_with = "stacks")]
        all: bool,
    },

    /// Print the live status of stacks (all if none are named).
    Status {
        #[arg(value_name = "STACK")]
        stacks: Vec<String>,
    },

    /// Work with change sets (previewed updates) of a deployed stack.
    #[command(name = "change-set", subcommand)]
    ChangeSet(ChangeSetCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum ChangeSetCommand {
    /// Create a change set from the stack's current template and wait for it.
    Create {
        #[arg(long)]
        stack: String,
        #[arg(long)]
        name: String,
    },
    /// Execute a change set and wait for the update to settle.
    Execute {
        #[arg(long)]
        stack: String,
        #[arg(long)]
        name: String,
    },
    /// Show the status and changes of a change set.
    Describe {
        #[arg(long)]
        stack: String,
        #[arg(long)]
        name: String,
    },
    /// List the change sets of a stack.
    List {
        #[arg(long)]
        stack: String,
    },
    /// Delete a change set.
    Delete {
        #[arg(long)]
        stack: String,
        #[arg(long)]
        name: String,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
