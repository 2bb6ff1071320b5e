//! Git backend.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{Args, BackendKind, Branch, LogEntry, Revision, Tool, VcsBackend, sanitize, split_nul};
use crate::error::{Result, VcsError};
use crate::status::{self, RemoteStatus, Status, StatusMap};

const LOG_FORMAT: &str = "--pretty=%h%x00%H%x00%an <%ae>%x00%ct%x00%s%x00%x00";

/// Git adapter.
#[derive(Debug)]
pub struct Git {
    tool: Tool,
}

impl Git {
    pub(crate) const fn new(tool: Tool) -> Self {
        Self { tool }
    }

    fn head_ref(&self) -> Option<String> {
        self.tool
            .text(Args::new(["symbolic-ref", "HEAD"]))
            .ok()
            .map(|head| head.trim().to_string())
            .filter(|head| !head.is_empty())
    }

    fn upstream_ref(&self, head: &str) -> Result<Option<String>> {
        let upstream = self
            .tool
            .text(Args::new(["for-each-ref", "--format=%(upstream)", head]))?;
        let upstream = upstream.trim();
        Ok((!upstream.is_empty()).then(|| upstream.to_string()))
    }

    fn porcelain(&self) -> Result<StatusMap> {
        let output = self.tool.bytes(Args::new(["status", "--porcelain"]))?;
        Ok(parse_porcelain(&String::from_utf8_lossy(&output)))
    }
}

impl VcsBackend for Git {
    fn kind(&self) -> BackendKind {
        BackendKind::Git
    }

    fn root(&self) -> &Path {
        self.tool.root()
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.tool.quiet(Args::new(["commit", "-m", message]))
    }

    fn add(&self, files: &[PathBuf]) -> Result<()> {
        self.tool.quiet(Args::new(["add", "--all"]).files(files))
    }

    fn reset(&self, files: &[PathBuf]) -> Result<()> {
        self.tool.quiet(Args::new(["reset"]).files(files))
    }

    fn pull(&self, source: Option<&str>) -> Result<()> {
        self.tool.quiet(Args::new(["pull"]).maybe(source))
    }

    fn push(&self, target: Option<&str>) -> Result<()> {
        self.tool.quiet(Args::new(["push"]).maybe(target))
    }

    fn checkout(&self, rev: &str) -> Result<()> {
        self.tool.quiet(Args::new(["checkout", rev.trim()]))
    }

    fn file_content(&self, spec: &str, name: &str) -> Result<Vec<u8>> {
        self.tool
            .bytes(Args::new(["--no-pager", "show"]).arg(format!("{spec}:{name}")))
    }

    fn status_all_files(&self) -> Result<StatusMap> {
        let mut statuses = StatusMap::new();

        // Untracked directories git shows as a whole; empty ones never get a
        // porcelain line and stay `none`.
        let others = self.tool.bytes(Args::new([
            "ls-files",
            "-z",
            "--others",
            "--directory",
            "--exclude-standard",
        ]))?;
        for path in split_nul(&others).filter(|path| path.ends_with('/')) {
            status::record(&mut statuses, &path, Status::None);
        }

        statuses.extend(self.porcelain()?);
        Ok(statuses)
    }

    fn status_root(&self) -> Result<Status> {
        Ok(status::root_status(&self.porcelain()?))
    }

    fn ignored_files(&self) -> Result<BTreeSet<String>> {
        let output = self.tool.bytes(Args::new([
            "ls-files",
            "-z",
            "--others",
            "--directory",
            "--ignored",
            "--exclude-standard",
        ]))?;
        Ok(split_nul(&output)
            .map(|path| status::normalize_subpath(&path))
            .filter(|path| !path.is_empty())
            .collect())
    }

    fn remote_status(&self) -> Result<RemoteStatus> {
        let Some(head) = self.head_ref() else {
            return Ok(RemoteStatus::None);
        };
        let Some(upstream) = self.upstream_ref(&head).unwrap_or(None) else {
            return Ok(RemoteStatus::None);
        };

        let output = self
            .tool
            .text(Args::new(["rev-list", "--left-right"]).arg(format!("{upstream}...{head}")))?;
        Ok(parse_left_right(&output))
    }

    fn branch(&self) -> Result<Branch> {
        Ok(match self.head_ref() {
            None => Branch::Detached,
            Some(head) => match head.strip_prefix("refs/heads/") {
                Some(name) if !name.is_empty() => Branch::Named(name.to_string()),
                _ => Branch::None,
            },
        })
    }

    fn query_log(
        &self,
        rev: Option<&str>,
        files: &[PathBuf],
        max: Option<usize>,
    ) -> Result<Vec<LogEntry>> {
        let mut args = Args::new(["--no-pager", "log", LOG_FORMAT]);
        if let Some(rev) = rev {
            args = args.arg("-1").arg(rev);
        } else if let Some(max) = max {
            args = args.arg(format!("-{max}"));
        }
        let output = self.tool.bytes(args.files(files))?;
        parse_log(&String::from_utf8_lossy(&output))
    }

    fn files(&self, rev: &Revision) -> Result<Vec<String>> {
        let output = match rev.spec(self.kind()) {
            None => self.tool.bytes(Args::new(["ls-files", "-z"]))?,
            Some(spec) => self
                .tool
                .bytes(Args::new(["ls-tree", "--name-only", "-r", "-z"]).arg(spec))?,
        };
        Ok(split_nul(&output).collect())
    }

    fn remote_url(&self) -> Result<Option<String>> {
        let Some(head) = self.head_ref() else {
            return Ok(None);
        };
        let Some(upstream) = self.upstream_ref(&head).unwrap_or(None) else {
            return Ok(None);
        };
        let Some(remote) = upstream
            .strip_prefix("refs/remotes/")
            .and_then(|rest| rest.split('/').next())
        else {
            return Ok(None);
        };

        match self
            .tool
            .text(Args::new(["config", "--get"]).arg(format!("remote.{remote}.url")))
        {
            Ok(url) => Ok(Some(url.trim().to_string()).filter(|url| !url.is_empty())),
            Err(VcsError::ExternalTool { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn revision_id(&self, rev: &Revision) -> Result<Option<String>> {
        let Some(spec) = rev.spec(self.kind()) else {
            return Ok(None);
        };
        match self.tool.text(Args::new(["rev-parse", "--verify", "-q"]).arg(&spec)) {
            Ok(id) => Ok(Some(id.trim().to_string())),
            Err(VcsError::ExternalTool { .. }) if rev.is_head(self.kind()) => Ok(None),
            Err(VcsError::ExternalTool { .. }) => Err(VcsError::RevisionNotFound(spec)),
            Err(e) => Err(e),
        }
    }

    fn diff(&self, rev: Option<&Revision>, files: &[PathBuf]) -> Result<String> {
        let mut args = Args::new(["--no-pager", "diff"]);
        match rev {
            None => {}
            Some(Revision::Index) => args = args.arg("--cached"),
            Some(rev) => args = args.maybe(rev.spec(self.kind())),
        }
        self.tool.text(args.files(files))
    }

    fn raw_log(&self, files: &[PathBuf]) -> Result<String> {
        self.tool.text(Args::new(["--no-pager", "log"]).files(files))
    }
}

/// Translate a porcelain `XY` code.
pub(crate) fn translate(x: char, y: char) -> Status {
    match (x, y) {
        ('D', 'D' | 'U') | ('A', 'A' | 'U') | ('U', 'A' | 'D' | 'U') => Status::Conflict,
        ('M' | 'A' | 'D' | 'R' | 'C', ' ') => Status::Staged,
        (' ' | 'M' | 'A' | 'D' | 'R' | 'C', 'M') => Status::Changed,
        (' ' | 'M' | 'A' | 'R' | 'C', 'D') => Status::Deleted,
        ('?', '?') => Status::Untracked,
        ('!', '!') => Status::Ignored,
        _ => Status::Unknown,
    }
}

/// Parse `git status --porcelain` (v1, newline separated).
pub(crate) fn parse_porcelain(output: &str) -> StatusMap {
    let mut statuses = StatusMap::new();
    for line in output.lines() {
        let mut chars = line.chars();
        let (Some(x), Some(y), Some(' ')) = (chars.next(), chars.next(), chars.next()) else {
            continue;
        };
        let path = chars.as_str();
        let path = match path.split_once(" -> ") {
            Some((_, new)) if matches!(x, 'R' | 'C') || matches!(y, 'R' | 'C') => new,
            _ => path,
        };
        status::record(&mut statuses, &unquote(path), translate(x, y));
    }
    statuses
}

/// Undo git's C-style quoting of unusual path names.
pub(crate) fn unquote(path: &str) -> String {
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return path.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut iter = inner.bytes().peekable();
    while let Some(byte) = iter.next() {
        if byte != b'\\' {
            bytes.push(byte);
            continue;
        }
        match iter.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'r') => bytes.push(b'\r'),
            Some(b'a') => bytes.push(0x07),
            Some(b'b') => bytes.push(0x08),
            Some(b'f') => bytes.push(0x0c),
            Some(b'v') => bytes.push(0x0b),
            Some(digit @ b'0'..=b'7') => {
                let mut value = u32::from(digit - b'0');
                for _ in 0..2 {
                    match iter.peek() {
                        Some(next @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(next - b'0');
                            iter.next();
                        }
                        _ => break,
                    }
                }
                bytes.push(u8::try_from(value).unwrap_or(u8::MAX));
            }
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn parse_left_right(output: &str) -> RemoteStatus {
    let ahead = output.lines().any(|line| line.starts_with('>'));
    let behind = output.lines().any(|line| line.starts_with('<'));
    RemoteStatus::from_divergence(ahead, behind)
}

/// Parse log output produced with [`LOG_FORMAT`].
pub(crate) fn parse_log(output: &str) -> Result<Vec<LogEntry>> {
    output
        .split("\0\0")
        .map(|record| record.trim_start_matches('\n'))
        .filter(|record| !record.trim().is_empty())
        .map(|record| {
            let fields: Vec<&str> = record.split('\0').collect();
            let [short, revid, author, timestamp, subject] = fields[..] else {
                return Err(VcsError::parse("git", format!("log record with {} fields", fields.len())));
            };
            let seconds: i64 = timestamp
                .trim()
                .parse()
                .map_err(|_| VcsError::parse("git", format!("bad timestamp {timestamp:?}")))?;
            let date = DateTime::<Utc>::from_timestamp(seconds, 0)
                .ok_or_else(|| VcsError::parse("git", format!("timestamp out of range: {seconds}")))?;
            Ok(LogEntry {
                short: short.to_string(),
                revid: revid.to_string(),
                author: sanitize(author),
                date,
                summary: sanitize(subject),
            })
        })
        .collect()
}
