//! GNU Bazaar backend.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{Args, BackendKind, Branch, LogEntry, Revision, Tool, VcsBackend, sanitize, split_nul};
use crate::error::{Result, VcsError};
use crate::status::{self, RemoteStatus, Status, StatusMap};

const TIMESTAMP_FORMAT: &str = "%a %Y-%m-%d %H:%M:%S %z";

/// Bazaar adapter.
#[derive(Debug)]
pub struct Bzr {
    tool: Tool,
}

impl Bzr {
    pub(crate) const fn new(tool: Tool) -> Self {
        Self { tool }
    }
}

impl VcsBackend for Bzr {
    fn kind(&self) -> BackendKind {
        BackendKind::Bzr
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
        self.tool
            .quiet(Args::new(["remove", "--keep", "--new"]).files(files))
    }

    fn pull(&self, source: Option<&str>) -> Result<()> {
        self.tool.quiet(Args::new(["pull"]).maybe(source))
    }

    fn push(&self, target: Option<&str>) -> Result<()> {
        self.tool.quiet(Args::new(["push"]).maybe(target))
    }

    fn checkout(&self, rev: &str) -> Result<()> {
        self.tool.quiet(Args::new(["update", "-r", rev.trim()]))
    }

    fn file_content(&self, spec: &str, name: &str) -> Result<Vec<u8>> {
        self.tool
            .bytes(Args::new(["cat", "-r", spec]).files(&[PathBuf::from(name)]))
    }

    fn status_all_files(&self) -> Result<StatusMap> {
        Ok(parse_status(
            &self.tool.text(Args::new(["status", "--short", "--no-classify"]))?,
        ))
    }

    fn ignored_files(&self) -> Result<BTreeSet<String>> {
        let output = self
            .tool
            .bytes(Args::new(["ls", "--recursive", "--null", "--ignored"]))?;
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
        Ok(match self.tool.text(Args::new(["nick"])) {
            Ok(nick) if !nick.trim().is_empty() => Branch::Named(nick.trim().to_string()),
            Ok(_) | Err(VcsError::ExternalTool { .. }) => Branch::None,
            Err(e) => return Err(e),
        })
    }

    fn query_log(
        &self,
        rev: Option<&str>,
        files: &[PathBuf],
        max: Option<usize>,
    ) -> Result<Vec<LogEntry>> {
        let mut args = Args::new(["log", "--log-format", "long", "-n0", "--show-ids"]);
        if let Some(rev) = rev {
            args = args.arg("-r").arg(rev);
        } else if let Some(max) = max {
            args = args.arg("-l").arg(max.to_string());
        }
        let output = self.tool.text(args.files(files))?;
        parse_log(&output)
    }

    fn files(&self, rev: &Revision) -> Result<Vec<String>> {
        let spec = rev.spec(self.kind());
        let output = self.tool.bytes(
            Args::new(["ls", "--recursive", "--versioned", "--kind=file", "--null"])
                .opt("-r", spec),
        )?;
        Ok(split_nul(&output).collect())
    }

    fn remote_url(&self) -> Result<Option<String>> {
        match self.tool.text(Args::new(["config", "parent_location"])) {
            Ok(url) => Ok(Some(url.trim().to_string()).filter(|url| !url.is_empty())),
            Err(VcsError::ExternalTool { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn diff(&self, rev: Option<&Revision>, files: &[PathBuf]) -> Result<String> {
        let spec = rev.and_then(|rev| rev.spec(self.kind()));
        // `bzr diff` exits 1 when differences were found.
        let invocation = self
            .tool
            .invocation(Args::new(["diff"]).opt("-r", spec).files(files))
            .allow_code(1);
        let output = self.tool.run(&invocation)?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    fn raw_log(&self, files: &[PathBuf]) -> Result<String> {
        self.tool.text(Args::new(["log"]).files(files))
    }
}

/// Translate the versioning and content columns of `bzr status --short`.
pub(crate) fn translate(versioning: char, content: char) -> Status {
    match (versioning, content) {
        ('C', _) => Status::Conflict,
        ('?', _) => Status::Untracked,
        (_, 'D') => Status::Deleted,
        (_, 'M' | 'K') => Status::Changed,
        ('+' | 'R' | '-', _) => Status::Staged,
        (_, 'N') => Status::Staged,
        _ => Status::Unknown,
    }
}

pub(crate) fn parse_status(output: &str) -> StatusMap {
    let mut statuses = StatusMap::new();
    for line in output.lines() {
        let chars: Vec<char> = line.chars().collect();
        if chars.len() < 5 {
            continue;
        }
        let path: String = chars[4..].iter().collect();
        let path = match path.split_once(" => ") {
            Some((_, new)) => new.to_string(),
            None => path,
        };
        status::record(&mut statuses, path.trim_end(), translate(chars[0], chars[1]));
    }
    statuses
}

/// Parse `bzr log --log-format long --show-ids`.
pub(crate) fn parse_log(output: &str) -> Result<Vec<LogEntry>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-') {
            blocks.push(Vec::new());
        } else if let Some(block) = blocks.last_mut() {
            block.push(trimmed);
        }
    }

    blocks
        .iter()
        .filter(|block| block.iter().any(|line| line.starts_with("revno:")))
        .map(|block| parse_log_block(block))
        .collect()
}

fn parse_log_block(lines: &[&str]) -> Result<LogEntry> {
    let field = |name: &str| {
        lines
            .iter()
            .find_map(|line| line.strip_prefix(name))
            .map(str::trim)
            .ok_or_else(|| VcsError::parse("bzr", format!("log entry without {name}")))
    };

    let short = field("revno:")?
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();
    let timestamp = field("timestamp:")?;
    let date = DateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|e| VcsError::parse("bzr", format!("bad timestamp {timestamp:?}: {e}")))?
        .with_timezone(&Utc);
    let summary = lines
        .iter()
        .skip_while(|line| **line != "message:")
        .nth(1)
        .copied()
        .unwrap_or_default();

    Ok(LogEntry {
        short,
        revid: field("revision-id:")?.to_string(),
        author: sanitize(field("committer:")?),
        date,
        summary: sanitize(summary),
    })
}
