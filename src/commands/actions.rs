//! Commands that change the repository. Errors propagate unchanged so the
//! binary can print the tool's diagnosis with hints.

use crate::VcsContext;
use crate::backend::Revision;
use crate::commands::context::CommandContext;
use anyhow::Result;
use std::path::Path;

/// Add files (everything when `files` is empty)
///
/// # Errors
///
/// Returns an error if a file is outside the repository or the tool fails
pub fn add(ctx: &VcsContext, dir: Option<&Path>, files: &[String]) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let paths = workspace.root_relative(files)?;
    workspace.backend().add(&paths)?;
    if files.is_empty() {
        super::print_success("Added all changes");
    } else {
        super::print_success(&format!("Added {} path(s)", files.len()));
    }
    Ok(())
}

/// Unstage files (everything staged when `files` is empty)
///
/// # Errors
///
/// Returns an error if a file is outside the repository or the tool fails
pub fn reset(ctx: &VcsContext, dir: Option<&Path>, files: &[String]) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let paths = workspace.root_relative(files)?;
    workspace.backend().reset(&paths)?;
    super::print_success("Unstaged changes");
    Ok(())
}

/// Record a revision
///
/// # Errors
///
/// Returns an error if the message is empty or the tool fails
pub fn commit(ctx: &VcsContext, dir: Option<&Path>, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        anyhow::bail!("Commit message cannot be empty");
    }
    let workspace = ctx.open_workspace(dir)?;
    workspace.backend().commit(message)?;
    match workspace.backend().info(&Revision::Head)? {
        Some(head) => super::print_success(&format!("[{}] {}", head.short, head.summary)),
        None => super::print_success("Committed"),
    }
    Ok(())
}

/// Pull from `source` (the configured default when `None`)
///
/// # Errors
///
/// Returns an error if the tool fails or the backend cannot pull from an
/// explicit source
pub fn pull(ctx: &VcsContext, dir: Option<&Path>, source: Option<&str>) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    crate::output::action("Pulling", source.unwrap_or("from default remote"));
    workspace.backend().pull(source)?;
    super::print_success("Pull complete");
    Ok(())
}

/// Push to `target` (the configured default when `None`)
///
/// # Errors
///
/// Returns an error if the tool fails or the backend has no push
pub fn push(ctx: &VcsContext, dir: Option<&Path>, target: Option<&str>) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    crate::output::action("Pushing", target.unwrap_or("to default remote"));
    workspace.backend().push(target)?;
    super::print_success("Push complete");
    Ok(())
}

/// Update the working copy to `revision`
///
/// # Errors
///
/// Returns an error if the tool fails
pub fn checkout(ctx: &VcsContext, dir: Option<&Path>, revision: &str) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    workspace.backend().checkout(revision)?;
    super::print_success(&format!("Checked out {revision}"));
    Ok(())
}

/// Write `name` as of `revision` to `dest`
///
/// # Errors
///
/// Returns an error if the file does not exist in the revision or `dest`
/// cannot be written
pub fn extract(
    ctx: &VcsContext,
    dir: Option<&Path>,
    revision: &str,
    name: &str,
    dest: &Path,
) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let revision: Revision = match revision.parse() {
        Ok(revision) => revision,
        Err(never) => match never {},
    };
    let dest = workspace.cwd.join(dest);
    workspace.backend().extract_file(&revision, name, &dest)?;
    super::print_success(&format!("Wrote {name}@{revision} to {}", dest.display()));
    Ok(())
}
