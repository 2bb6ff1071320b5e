//! Mercurial backend.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Args, BackendKind, Branch, LogEntry, Revision, Tool, VcsBackend, sanitize, split_nul};
use crate::error::{Result, VcsError};
use crate::status::{self, RemoteStatus, Status, StatusMap};

/// Mercurial adapter.
#[derive(Debug)]
pub struct Hg {
    tool: Tool,
}

/// One element of `hg log --template json`.
#[derive(Debug, Deserialize)]
struct JsonEntry {
    rev: i64,
    node: String,
    user: String,
    date: (f64, i64),
    desc: String,
}

impl Hg {
    pub(crate) const fn new(tool: Tool) -> Self {
        Self { tool }
    }
}

impl VcsBackend for Hg {
    fn kind(&self) -> BackendKind {
        BackendKind::Hg
    }

    fn root(&self) -> &Path {
        self.tool.root()
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.tool.quiet(Args::new(["commit", "-m", message]))
    }

    fn add(&self, files: &[PathBuf]) -> Result<()> {
        self.tool.quiet(Args::new(["add"]).files(files))
    }

    fn reset(&self, files: &[PathBuf]) -> Result<()> {
        let files = if files.is_empty() {
            // `forget` needs explicit names: unschedule every added file.
            self.status_all_files()?
                .into_iter()
                .filter(|(_, status)| *status == Status::Staged)
                .map(|(path, _)| PathBuf::from(path))
                .collect()
        } else {
            files.to_vec()
        };
        if files.is_empty() {
            return Ok(());
        }
        self.tool.quiet(Args::new(["forget"]).files(&files))
    }

    fn pull(&self, source: Option<&str>) -> Result<()> {
        self.tool.quiet(Args::new(["pull", "-u"]).maybe(source))
    }

    fn push(&self, target: Option<&str>) -> Result<()> {
        self.tool.quiet(Args::new(["push"]).maybe(target))
    }

    fn checkout(&self, rev: &str) -> Result<()> {
        self.tool.quiet(Args::new(["update", rev.trim()]))
    }

    fn file_content(&self, spec: &str, name: &str) -> Result<Vec<u8>> {
        self.tool
            .bytes(Args::new(["cat", "--rev", spec]).files(&[PathBuf::from(name)]))
    }

    fn status_all_files(&self) -> Result<StatusMap> {
        Ok(parse_status(&self.tool.text(Args::new(["status"]))?))
    }

    fn ignored_files(&self) -> Result<BTreeSet<String>> {
        let output = self
            .tool
            .bytes(Args::new(["status", "--ignored", "--no-status", "--print0"]))?;
        Ok(split_nul(&output)
            .map(|path| status::normalize_subpath(&path))
            .filter(|path| !path.is_empty())
            .collect())
    }

    fn remote_status(&self) -> Result<RemoteStatus> {
        Ok(match self.remote_url()? {
            None => RemoteStatus::None,
            Some(_) => RemoteStatus::Unknown,
        })
    }

    fn branch(&self) -> Result<Branch> {
        let branch = self.tool.text(Args::new(["branch"]))?;
        let branch = branch.trim();
        Ok(if branch.is_empty() {
            Branch::None
        } else {
            Branch::Named(branch.to_string())
        })
    }

    fn query_log(
        &self,
        rev: Option<&str>,
        files: &[PathBuf],
        max: Option<usize>,
    ) -> Result<Vec<LogEntry>> {
        let mut args = Args::new(["log", "--template", "json"]);
        if let Some(rev) = rev {
            args = args.arg("--limit").arg("1").arg("--rev").arg(rev);
        } else if let Some(max) = max {
            args = args.arg("--limit").arg(max.to_string());
        }
        let output = self.tool.text(args.files(files))?;
        parse_log(&output)
    }

    fn files(&self, rev: &Revision) -> Result<Vec<String>> {
        let spec = rev.spec(self.kind());
        let output = self
            .tool
            .bytes(Args::new(["files", "--print0"]).opt("--rev", spec))?;
        Ok(split_nul(&output).collect())
    }

    fn remote_url(&self) -> Result<Option<String>> {
        match self.tool.text(Args::new(["showconfig", "paths.default"])) {
            Ok(url) => Ok(Some(url.trim().to_string()).filter(|url| !url.is_empty())),
            Err(VcsError::ExternalTool { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn diff(&self, rev: Option<&Revision>, files: &[PathBuf]) -> Result<String> {
        let spec = rev.and_then(|rev| rev.spec(self.kind()));
        self.tool
            .text(Args::new(["diff", "--git"]).opt("-r", spec).files(files))
    }

    fn raw_log(&self, files: &[PathBuf]) -> Result<String> {
        self.tool.text(Args::new(["log"]).files(files))
    }
}

/// Translate a one-letter `hg status` code for `path`.
pub(crate) fn translate(code: char, path: &str) -> Status {
    match code {
        'A' | 'R' => Status::Staged,
        'M' => Status::Changed,
        '!' => Status::Deleted,
        // Merge leftovers.
        '?' if path.ends_with(".orig") => Status::Conflict,
        '?' => Status::Untracked,
        'I' => Status::Ignored,
        'C' => Status::Sync,
        _ => Status::Unknown,
    }
}

pub(crate) fn parse_status(output: &str) -> StatusMap {
    let mut statuses = StatusMap::new();
    for line in output.lines() {
        let mut chars = line.chars();
        let (Some(code), Some(' ')) = (chars.next(), chars.next()) else {
            continue;
        };
        let path = chars.as_str();
        status::record(&mut statuses, path, translate(code, path));
    }
    statuses
}

pub(crate) fn parse_log(output: &str) -> Result<Vec<LogEntry>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<JsonEntry> =
        serde_json::from_str(output).map_err(|e| VcsError::parse("hg", e.to_string()))?;

    entries
        .into_iter()
        .map(|entry| {
            let (seconds, _offset) = entry.date;
            #[allow(clippy::cast_possible_truncation)]
            let date = DateTime::<Utc>::from_timestamp(seconds as i64, 0)
                .ok_or_else(|| VcsError::parse("hg", format!("date out of range: {seconds}")))?;
            Ok(LogEntry {
                short: entry.rev.to_string(),
                revid: entry.node,
                author: sanitize(&entry.user),
                date,
                summary: sanitize(entry.desc.lines().next().unwrap_or_default()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case('A', "new.rs", Status::Staged)]
    #[case('R', "gone.rs", Status::Staged)]
    #[case('M', "lib.rs", Status::Changed)]
    #[case('!', "lost.rs", Status::Deleted)]
    #[case('?', "scratch.txt", Status::Untracked)]
    #[case('?', "main.rs.orig", Status::Conflict)]
    #[case('I', "target", Status::Ignored)]
    #[case('C', "clean.rs", Status::Sync)]
    #[case('Z', "odd.rs", Status::Unknown)]
    fn test_translate(#[case] code: char, #[case] path: &str, #[case] expected: Status) {
        assert_eq!(translate(code, path), expected);
    }

    #[test]
    fn test_parse_status_drops_clean() {
        let statuses = parse_status("M src/lib.rs\nC README\n? notes/todo.txt\n? a.c.orig\n");
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses.get("src/lib.rs"), Some(&Status::Changed));
        assert_eq!(statuses.get("a.c.orig"), Some(&Status::Conflict));
        assert!(!statuses.contains_key("README"));
    }

    #[test]
    fn test_parse_log_json() -> Result<()> {
        let output = r#"[
          {"bookmarks": [], "branch": "default", "date": [1700000000.0, -3600],
           "desc": "Fix parser\n\nlong body", "node": "0123456789abcdef", "rev": 42,
           "user": "Jane <jane@example.org>", "tags": ["tip"]}
        ]"#;
        let entries = parse_log(output)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].short, "42");
        assert_eq!(entries[0].revid, "0123456789abcdef");
        assert_eq!(entries[0].summary, "Fix parser");
        assert_eq!(entries[0].date.timestamp(), 1_700_000_000);
        Ok(())
    }

    #[test]
    fn test_parse_log_empty_and_invalid() {
        assert!(parse_log("").is_ok_and(|entries| entries.is_empty()));
        assert!(matches!(parse_log("{not json"), Err(VcsError::Parse { .. })));
    }
}
