//! Subversion backend.
//!
//! `svn log --xml` and `svn info --xml` are read with a small tag scanner;
//! the documents are flat and machine generated.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::{Args, BackendKind, Branch, LogEntry, Revision, Tool, VcsBackend, sanitize};
use crate::error::{Result, VcsError};
use crate::status::{self, RemoteStatus, Status, StatusMap};

/// Subversion adapter.
#[derive(Debug)]
pub struct Svn {
    tool: Tool,
}

impl Svn {
    pub(crate) const fn new(tool: Tool) -> Self {
        Self { tool }
    }

    fn unsupported(operation: &'static str) -> VcsError {
        VcsError::Unsupported {
            backend: "svn",
            operation,
        }
    }
}

impl VcsBackend for Svn {
    fn kind(&self) -> BackendKind {
        BackendKind::Svn
    }

    fn root(&self) -> &Path {
        self.tool.root()
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.tool.quiet(Args::new(["commit", "-m", message]))
    }

    fn add(&self, files: &[PathBuf]) -> Result<()> {
        if files.is_empty() {
            return self.tool.quiet(Args::new(["add", "--force", "."]));
        }
        self.tool.quiet(Args::new(["add"]).files(files))
    }

    fn reset(&self, files: &[PathBuf]) -> Result<()> {
        let files = if files.is_empty() {
            self.status_all_files()?
                .into_iter()
                .filter(|(_, status)| {
                    !matches!(status, Status::Untracked | Status::Ignored | Status::None)
                })
                .map(|(path, _)| PathBuf::from(path))
                .collect()
        } else {
            files.to_vec()
        };
        if files.is_empty() {
            return Ok(());
        }
        self.tool.quiet(Args::new(["revert"]).files(&files))
    }

    fn pull(&self, source: Option<&str>) -> Result<()> {
        if source.is_some() {
            return Err(Self::unsupported("pull from an explicit source"));
        }
        self.tool.quiet(Args::new(["update"]))
    }

    fn push(&self, _target: Option<&str>) -> Result<()> {
        Err(Self::unsupported("push"))
    }

    fn checkout(&self, rev: &str) -> Result<()> {
        self.tool.quiet(Args::new(["update", "-r", rev.trim()]))
    }

    fn file_content(&self, spec: &str, name: &str) -> Result<Vec<u8>> {
        self.tool
            .bytes(Args::new(["cat", "-r", spec]).files(&[PathBuf::from(name)]))
    }

    fn status_all_files(&self) -> Result<StatusMap> {
        Ok(parse_status(&self.tool.text(Args::new(["status"]))?))
    }

    fn ignored_files(&self) -> Result<BTreeSet<String>> {
        let output = self.tool.text(Args::new(["status", "--no-ignore"]))?;
        Ok(parse_status(&output)
            .into_iter()
            .filter(|(_, status)| *status == Status::Ignored)
            .map(|(path, _)| path)
            .collect())
    }

    fn remote_status(&self) -> Result<RemoteStatus> {
        Ok(match self.remote_url()? {
            Some(url) if !url.starts_with("file://") => RemoteStatus::Unknown,
            _ => RemoteStatus::None,
        })
    }

    fn branch(&self) -> Result<Branch> {
        Ok(Branch::None)
    }

    fn query_log(
        &self,
        rev: Option<&str>,
        files: &[PathBuf],
        max: Option<usize>,
    ) -> Result<Vec<LogEntry>> {
        let mut args = Args::new(["log", "--xml"]);
        if let Some(rev) = rev {
            args = args.arg("--limit").arg("1").arg("--revision").arg(rev);
        } else if let Some(max) = max {
            args = args.arg("--limit").arg(max.to_string());
        }
        let output = self.tool.text(args.files(files))?;
        parse_log(&output)
    }

    fn files(&self, rev: &Revision) -> Result<Vec<String>> {
        let spec = rev.spec(self.kind());
        let output = self.tool.text(Args::new(["list", "-R"]).opt("-r", spec))?;
        Ok(output
            .lines()
            .filter(|line| !line.is_empty() && !line.ends_with('/'))
            .map(str::to_string)
            .collect())
    }

    fn remote_url(&self) -> Result<Option<String>> {
        let output = match self.tool.text(Args::new(["info", "--xml"])) {
            Ok(output) => output,
            Err(VcsError::ExternalTool { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(elements(&output, "entry")
            .into_iter()
            .next()
            .and_then(|(_, entry)| elements(entry, "url").into_iter().next())
            .map(|(_, url)| unescape(url).trim().to_string())
            .filter(|url| !url.is_empty()))
    }

    fn diff(&self, rev: Option<&Revision>, files: &[PathBuf]) -> Result<String> {
        let spec = rev.and_then(|rev| rev.spec(self.kind()));
        self.tool
            .text(Args::new(["diff"]).opt("-r", spec).files(files))
    }

    fn raw_log(&self, files: &[PathBuf]) -> Result<String> {
        self.tool.text(Args::new(["log"]).files(files))
    }
}

/// Translate the first column of `svn status`.
pub(crate) fn translate(code: char) -> Status {
    match code {
        'A' | 'D' | 'R' => Status::Staged,
        'C' => Status::Conflict,
        'I' => Status::Ignored,
        'M' | '~' => Status::Changed,
        'X' => Status::None,
        '?' => Status::Untracked,
        '!' => Status::Deleted,
        _ => Status::Unknown,
    }
}

pub(crate) fn parse_status(output: &str) -> StatusMap {
    let mut statuses = StatusMap::new();
    for line in output.lines() {
        let Some(code) = line.chars().next() else {
            continue;
        };
        if code == ' ' || line.len() <= 8 || !line.is_char_boundary(8) {
            continue;
        }
        status::record(&mut statuses, &line[8..], translate(code));
    }
    statuses
}

pub(crate) fn parse_log(output: &str) -> Result<Vec<LogEntry>> {
    elements(output, "logentry")
        .into_iter()
        .map(|(open, body)| {
            let revision = attribute(open, "revision")
                .ok_or_else(|| VcsError::parse("svn", "logentry without revision"))?;
            let text = |tag: &str| {
                elements(body, tag)
                    .into_iter()
                    .next()
                    .map(|(_, inner)| unescape(inner))
                    .unwrap_or_default()
            };
            let raw_date = text("date");
            let date = DateTime::parse_from_rfc3339(raw_date.trim())
                .map_err(|e| VcsError::parse("svn", format!("bad date {raw_date:?}: {e}")))?
                .with_timezone(&Utc);
            let message = text("msg");
            Ok(LogEntry {
                short: revision.clone(),
                revid: revision,
                author: sanitize(&text("author")),
                date,
                summary: sanitize(message.lines().next().unwrap_or_default()),
            })
        })
        .collect()
}

/// Every `<tag ...>inner</tag>` in `xml`, as (opening tag, inner text).
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<(&'a str, &'a str)> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        // Reject longer names sharing the prefix (`<entry` vs `<entrypoint`).
        if !after.starts_with(['>', ' ', '\n', '\t', '\r', '/']) {
            rest = after;
            continue;
        }
        let Some(tag_end) = after.find('>') else {
            break;
        };
        let opening = &after[..tag_end];
        let body_start = &after[tag_end + 1..];
        if opening.ends_with('/') {
            found.push((opening, ""));
            rest = body_start;
            continue;
        }
        let Some(body_end) = body_start.find(&close) else {
            break;
        };
        found.push((opening, &body_start[..body_end]));
        rest = &body_start[body_end + close.len()..];
    }
    found
}

fn attribute(opening: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let start = opening.find(&needle)? + needle.len();
    let end = opening[start..].find('"')?;
    Some(unescape(&opening[start..start + end]))
}

/// Character data of an element: entity and character references are
/// decoded, `<![CDATA[...]]>` sections are taken verbatim.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<![CDATA[") {
        decode_references(&rest[..start], &mut out);
        let section = &rest[start + "<![CDATA[".len()..];
        match section.find("]]>") {
            Some(end) => {
                out.push_str(&section[..end]);
                rest = &section[end + "]]>".len()..];
            }
            None => {
                out.push_str(section);
                return out;
            }
        }
    }
    decode_references(rest, &mut out);
    out
}

fn decode_references(text: &str, out: &mut String) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];
        let decoded = candidate
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| reference(&candidate[..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
}

fn reference(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => name.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
