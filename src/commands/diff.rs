//! `vcstat diff`.

use crate::VcsContext;
use crate::backend::Revision;
use crate::commands::context::CommandContext;
use anyhow::Result;
use colored::{ColoredString, Colorize};
use std::io::{self, Write};
use std::path::Path;

/// Execute diff command: the working copy against `revision`
///
/// # Errors
///
/// Returns an error if the directory is not in a repository or the backend
/// fails
pub fn execute(
    ctx: &VcsContext,
    dir: Option<&Path>,
    revision: Option<&str>,
    files: &[String],
) -> Result<()> {
    let workspace = ctx.open_workspace(dir)?;
    let files = workspace.root_relative(files)?;
    let revision: Option<Revision> = revision.map(|rev| match rev.parse() {
        Ok(rev) => rev,
        Err(never) => match never {},
    });

    let diff = workspace.backend().diff(revision.as_ref(), &files)?;
    if diff.is_empty() {
        super::print_info("No differences");
        return Ok(());
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in diff.lines() {
        writeln!(out, "{}", colorize(line))?;
    }
    Ok(())
}

/// Color one line of a unified diff
fn colorize(line: &str) -> ColoredString {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold()
    } else if line.starts_with("@@") {
        line.cyan()
    } else if line.starts_with('+') {
        line.green()
    } else if line.starts_with('-') {
        line.red()
    } else {
        line.normal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colorize_keeps_text() {
        colored::control::set_override(false);
        for line in ["+added", "-removed", "@@ -1 +1 @@", "--- a/x", " context"] {
            assert_eq!(colorize(line).to_string(), line);
        }
    }
}
