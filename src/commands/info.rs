//! `vcstat info`: root, backend, branch and revision summary.

use crate::VcsContext;
use crate::backend::Revision;
use crate::commands::context::CommandContext;
use crate::output;
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

fn parse_revision(revision: &str) -> Revision {
    match revision.parse() {
        Ok(revision) => revision,
        Err(never) => match never {},
    }
}

/// Show a single revision
///
/// # Errors
///
/// Returns an error if the revision does not exist or is ambiguous
pub fn info(ctx: &VcsContext, dir: Option<&Path>, revision: &str, id_only: bool) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let revision = parse_revision(revision);
    if id_only {
        match workspace.backend().revision_id(&revision)? {
            Some(id) => println!("{id}"),
            None => super::print_info("No revision identifier"),
        }
        return Ok(());
    }
    match workspace.backend().info(&revision)? {
        Some(entry) => super::log::print_entry(&entry),
        None if revision == Revision::Index => {
            super::print_info("The index is not a committed revision");
        }
        None => super::print_info("No commits yet"),
    }
    Ok(())
}

/// List the files of a revision
///
/// # Errors
///
/// Returns an error if the backend fails
pub fn files(ctx: &VcsContext, dir: Option<&Path>, revision: &str) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let revision = parse_revision(revision);
    for file in workspace.backend().files(&revision)? {
        println!("{file}");
    }
    Ok(())
}

/// Show branch, remote URL and remote status
///
/// # Errors
///
/// Returns an error if the backend fails
pub fn remote(ctx: &VcsContext, dir: Option<&Path>) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let snapshot = workspace.state.init_root()?;
    let url = workspace.backend().remote_url()?;

    println!("{}: {}", "Branch".bold(), snapshot.branch);
    match url {
        Some(url) => println!("{}: {url}", "Remote".bold()),
        None => println!("{}: {}", "Remote".bold(), "(none)".dimmed()),
    }
    println!("{}: {}", "Status".bold(), output::remote_label(snapshot.remote));
    Ok(())
}
