//! Command-line interface definitions for vcstat.
//!
//! This module contains all CLI argument parsing structures using clap's derive macros.
//! The CLI definitions are shared between the main binary and build tools (like xtask)
//! for man page generation.
//!
//! Note: Field-level documentation is provided via clap attributes (#[arg(help = "...")]),
//! so we allow missing_docs for this module to avoid redundant documentation.

#![allow(missing_docs)]

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Main CLI structure for vcstat.
#[derive(Parser)]
#[command(
    name = "vcstat",
    version = crate::VERSION,
    about = "Version control status for directory trees",
    long_about = "Discovers git, hg, bzr and svn repositories, reports per-file and \
                  per-directory status and keeps it fresh in the background"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Run as if started in this directory
    #[arg(short = 'C', global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Show debug logging (overrides VCSTAT_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show the status of the repository and of every path not in sync
    Status {
        /// One marker and path per line
        #[arg(short, long)]
        short: bool,
    },

    /// Show revision history
    Log {
        /// Maximum number of revisions
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,

        /// Print the tool's own log output
        #[arg(long)]
        raw: bool,

        /// Restrict to revisions touching these files
        files: Vec<String>,
    },

    /// Show a single revision
    Info {
        /// Revision (INDEX, HEAD or a backend revision id)
        #[arg(default_value = "HEAD")]
        revision: String,

        /// Print only the full revision identifier
        #[arg(long)]
        id: bool,
    },

    /// List the files of a revision
    Files {
        /// Revision (INDEX, HEAD or a backend revision id)
        #[arg(default_value = "INDEX")]
        revision: String,
    },

    /// Show changes against a revision
    Diff {
        /// Revision to compare with (INDEX for staged changes); the working
        /// tree against HEAD when omitted
        revision: Option<String>,

        /// Restrict to these files (after `--`)
        #[arg(last = true)]
        files: Vec<String>,
    },

    /// Show branch, remote URL and remote status
    Remote,

    /// Add files to the repository (everything when omitted)
    Add {
        /// Paths to add
        files: Vec<String>,
    },

    /// Unstage files (everything staged when omitted)
    Reset {
        /// Paths to unstage
        files: Vec<String>,
    },

    /// Record changes to the repository
    Commit {
        #[arg(short, long)]
        message: String,
    },

    /// Fetch from and integrate with another repository
    Pull {
        /// Source to pull from; the configured default when omitted
        source: Option<String>,
    },

    /// Update the remote repository
    Push {
        /// Target to push to; the configured default when omitted
        target: Option<String>,
    },

    /// Update the working tree to a revision
    Checkout {
        /// Revision to check out
        revision: String,
    },

    /// Write a file as it is in a revision
    Extract {
        /// Revision (INDEX, HEAD or a backend revision id)
        revision: String,

        /// Root-relative path of the file
        name: String,

        /// Destination path
        dest: PathBuf,
    },

    /// Watch directories and print statuses on every background refresh
    Watch {
        /// Directories to watch, shown as columns
        dirs: Vec<PathBuf>,

        /// Delay between refresh passes in milliseconds
        #[arg(long, value_name = "MS")]
        interval: Option<u64>,
    },

    /// Get and set configuration options
    Config {
        /// Configuration key
        key: Option<String>,

        /// Configuration value to set
        value: Option<String>,

        /// List all configuration values
        #[arg(short, long)]
        list: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
