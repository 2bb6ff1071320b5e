//! `vcstat log`.

use crate::VcsContext;
use crate::backend::LogEntry;
use crate::commands::context::CommandContext;
use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use std::path::Path;

/// Execute log command
///
/// # Errors
///
/// Returns an error if the directory is not in a repository, a file lies
/// outside it, or the backend fails
pub fn execute(
    ctx: &VcsContext,
    dir: Option<&Path>,
    limit: usize,
    raw: bool,
    files: &[String],
) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let files = workspace.root_relative(files)?;
    if raw {
        println!("{}", workspace.backend().raw_log(&files)?);
        return Ok(());
    }
    let entries = workspace.backend().log(&files, Some(limit))?;

    if entries.is_empty() {
        super::print_info("No commits yet");
        return Ok(());
    }

    for entry in &entries {
        print_entry(entry);
    }
    Ok(())
}

/// Print one revision in the long format
pub fn print_entry(entry: &LogEntry) {
    println!("{} {} ({})", "commit".yellow(), entry.revid, entry.short.yellow());
    println!("{}: {}", "Author".bold(), entry.author);
    println!(
        "{}: {}",
        "Date".bold(),
        entry.date.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    println!("\n    {}\n", entry.summary);
}
