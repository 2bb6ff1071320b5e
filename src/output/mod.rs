//! Output formatting and styling for the vcstat CLI.
//!
//! - Dimmed colors for routine messages
//! - Bold colors for warnings and errors
//! - One color per status code
//! - Verbosity control (quiet, normal, verbose)

use colored::{ColoredString, Colorize};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::status::{RemoteStatus, Status};

/// Verbosity level for output messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Suppress informational messages, show only warnings and errors.
    Quiet = 0,
    /// Default verbosity level, show all standard messages.
    Normal = 1,
    /// Show verbose debug messages in addition to standard output.
    Verbose = 2,
}

/// Global verbosity setting (default: Normal).
static VERBOSITY: AtomicU8 = AtomicU8::new(1);

/// Sets the global verbosity level for all output functions.
pub fn set_verbosity(level: Verbosity) {
    VERBOSITY.store(level as u8, Ordering::Relaxed);
}

/// Gets the current global verbosity level.
pub fn get_verbosity() -> Verbosity {
    match VERBOSITY.load(Ordering::Relaxed) {
        0 => Verbosity::Quiet,
        2 => Verbosity::Verbose,
        _ => Verbosity::Normal,
    }
}

/// Prints a success message in green (respects quiet mode).
pub fn success(message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{}", message.green());
}

/// Prints an error message in bold red (always shown).
pub fn error(message: &str) {
    eprintln!("{}", message.red().bold());
}

/// Prints a warning message in bold yellow (always shown).
pub fn warning(message: &str) {
    eprintln!("{}", message.yellow().bold());
}

/// Prints an informational message in dimmed color (respects quiet mode).
pub fn info(message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{}", message.dimmed());
}

/// Prints a git-style action message with dimmed verb and normal message.
pub fn action(verb: &str, message: &str) {
    if get_verbosity() == Verbosity::Quiet {
        return;
    }
    eprintln!("{} {}", verb.dimmed().bold(), message);
}

/// Status name in its color.
#[must_use]
pub fn status_label(status: Status) -> ColoredString {
    let name = status.as_str();
    match status {
        Status::Conflict => name.red().bold(),
        Status::Untracked => name.magenta(),
        Status::Deleted => name.red(),
        Status::Changed => name.yellow(),
        Status::Staged => name.green(),
        Status::Ignored | Status::None => name.dimmed(),
        Status::Sync => name.normal(),
        Status::Unknown => name.cyan(),
    }
}

/// Status marker character in the status color.
#[must_use]
pub fn status_marker(status: Status) -> ColoredString {
    let marker = status.marker().to_string();
    match status {
        Status::Conflict => marker.red().bold(),
        Status::Untracked => marker.magenta(),
        Status::Deleted => marker.red(),
        Status::Changed => marker.yellow(),
        Status::Staged => marker.green(),
        Status::Ignored | Status::None | Status::Sync => marker.dimmed(),
        Status::Unknown => marker.cyan(),
    }
}

/// Remote status name in its color.
#[must_use]
pub fn remote_label(remote: RemoteStatus) -> ColoredString {
    let name = remote.as_str();
    match remote {
        RemoteStatus::Sync => name.green(),
        RemoteStatus::Ahead | RemoteStatus::Behind => name.yellow(),
        RemoteStatus::Diverged => name.red(),
        RemoteStatus::None | RemoteStatus::Unknown => name.dimmed(),
    }
}
