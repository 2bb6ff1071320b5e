//! `vcstat status`: the root status followed by every path not in sync.

use crate::VcsContext;
use crate::commands::context::CommandContext;
use crate::output;
use crate::status::{Status, StatusMap};
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

/// Execute status command: refresh the repository and print its statuses
///
/// # Errors
///
/// Returns an error if the directory is not in a repository or the backend
/// fails
pub fn execute(ctx: &VcsContext, dir: Option<&Path>, short: bool) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let snapshot = workspace.state.update_root()?;
    let paths = snapshot.subpaths.clone().unwrap_or_default();

    if short {
        for (path, status) in &paths {
            println!("{} {path}", output::status_marker(*status));
        }
        return Ok(());
    }

    println!(
        "{} repository at {}",
        workspace.state.kind().as_str().bold(),
        workspace.state.root().display()
    );
    println!("On branch {}", snapshot.branch.to_string().cyan());
    if let Some(head) = &snapshot.head {
        println!("Head {} {}", head.short.yellow(), head.summary);
    }
    println!(
        "Status {}, remote {}",
        output::status_label(snapshot.status),
        output::remote_label(snapshot.remote)
    );

    if paths.is_empty() {
        println!();
        super::print_info("Working tree clean");
        return Ok(());
    }

    for status in Status::PRIORITY.into_iter().chain([Status::Unknown]) {
        print_status_group(&paths, status);
    }
    Ok(())
}

fn group_title(status: Status) -> &'static str {
    match status {
        Status::Conflict => "Unresolved conflicts:",
        Status::Untracked => "Untracked files:",
        Status::Deleted => "Deleted files:",
        Status::Changed => "Changes not staged:",
        Status::Staged => "Changes to be committed:",
        Status::Ignored => "Ignored files:",
        Status::Unknown => "Unknown state:",
        Status::Sync | Status::None => "Other:",
    }
}

fn print_status_group(paths: &StatusMap, status: Status) {
    let group: Vec<&String> = paths
        .iter()
        .filter(|(_, s)| **s == status)
        .map(|(path, _)| path)
        .collect();

    if group.is_empty() {
        return;
    }

    println!("\n{}", group_title(status).bold());
    for path in group {
        println!("  {:>10}: {path}", output::status_label(status));
    }
}
