//! Subcommand implementations, one module each, plus the shared message
//! helpers.

/// `add`, `reset`, `commit` and `update`.
pub mod actions;
/// Settings.
pub mod config;
/// Per-command repository setup.
pub mod context;
/// Diffs between revisions.
pub mod diff;
/// Repository summary.
pub mod info;
/// Revision history.
pub mod log;
/// Working tree status.
pub mod status;
/// Background refresh loop.
pub mod watch;

use colored::Colorize;

/// Print a green check mark followed by `message` to stdout.
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a red cross followed by `message` to stderr.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print `message` with an info marker to stdout.
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}
