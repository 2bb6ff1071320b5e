//! Backend adapters.
//!
//! One [`VcsBackend`] implementation per supported tool. A backend is bound to
//! a repository root and a [`ProcessRunner`] when the root state is created
//! and never changes afterwards.
//!
//! ```text
//!   RootState ──► Arc<dyn VcsBackend> ──► Tool ──► ProcessRunner ──► git/hg/bzr/svn
//!                     │
//!                     └── parse_* (pure, unit tested)
//! ```

mod bzr;
mod git;
mod hg;
mod svn;

pub use bzr::Bzr;
pub use git::Git;
pub use hg::Hg;
pub use svn::Svn;

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use crate::error::{Result, VcsError};
use crate::process::{Invocation, ProcessRunner};
use crate::status::{RemoteStatus, Status, StatusMap, root_status};

/// Supported version-control systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// Git
    Git,
    /// Mercurial
    Hg,
    /// GNU Bazaar / Breezy
    Bzr,
    /// Subversion
    Svn,
}

impl BackendKind {
    /// Marker lookup order when a directory carries several markers.
    pub const ALL: [Self; 4] = [Self::Git, Self::Hg, Self::Bzr, Self::Svn];

    /// Short name, also the executable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Bzr => "bzr",
            Self::Svn => "svn",
        }
    }

    /// Executable invoked for this backend.
    #[must_use]
    pub const fn program(self) -> &'static str {
        self.as_str()
    }

    /// Name of the metadata directory found at a repository root.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Git => ".git",
            Self::Hg => ".hg",
            Self::Bzr => ".bzr",
            Self::Svn => ".svn",
        }
    }

    /// The backend's spelling of the latest revision.
    #[must_use]
    pub const fn head_alias(self) -> &'static str {
        match self {
            Self::Git | Self::Svn => "HEAD",
            Self::Hg => "tip",
            Self::Bzr => "last:1",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown backend: {s}"))
    }
}

/// Revision selector understood by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Revision {
    /// The staging area (git) or working copy state.
    Index,
    /// The latest committed revision.
    Head,
    /// Backend-specific revision identifier.
    Id(String),
}

impl Revision {
    /// Backend spelling of this revision; `None` for [`Revision::Index`].
    #[must_use]
    pub fn spec(&self, kind: BackendKind) -> Option<String> {
        match self {
            Self::Index => None,
            Self::Head => Some(kind.head_alias().to_string()),
            Self::Id(id) => Some(id.trim().to_string()),
        }
    }

    /// Whether this designates the latest revision, either directly or
    /// through the backend's alias.
    #[must_use]
    pub fn is_head(&self, kind: BackendKind) -> bool {
        match self {
            Self::Head => true,
            Self::Id(id) => id.trim() == kind.head_alias(),
            Self::Index => false,
        }
    }
}

impl FromStr for Revision {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "INDEX" => Self::Index,
            "HEAD" => Self::Head,
            other => Self::Id(other.to_string()),
        })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => f.write_str("INDEX"),
            Self::Head => f.write_str("HEAD"),
            Self::Id(id) => f.write_str(id),
        }
    }
}

/// One revision as reported by the backend's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Abbreviated identifier (short hash, local revision number).
    pub short: String,
    /// Full identifier.
    pub revid: String,
    /// Author or committer.
    pub author: String,
    /// Commit date.
    pub date: DateTime<Utc>,
    /// First line of the message.
    pub summary: String,
}

/// Current branch of a working copy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Branch {
    /// A named branch.
    Named(String),
    /// Not on any branch (git detached HEAD).
    Detached,
    /// The backend has no branch concept, or reported none.
    #[default]
    None,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Detached => f.write_str("(detached)"),
            Self::None => f.write_str("-"),
        }
    }
}

/// Canonical operation set every backend implements.
///
/// Action operations mutate the repository and propagate every error. Data
/// operations only read; a failure makes the caller purge the root.
pub trait VcsBackend: Send + Sync + fmt::Debug {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Repository root the backend runs in.
    fn root(&self) -> &Path;

    /// Record a new revision with `message`.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn commit(&self, message: &str) -> Result<()>;

    /// Schedule `files` (everything when empty) for the next commit.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn add(&self, files: &[PathBuf]) -> Result<()>;

    /// Unschedule `files` (everything when empty).
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn reset(&self, files: &[PathBuf]) -> Result<()>;

    /// Bring in changes from `source` or the default remote.
    ///
    /// # Errors
    ///
    /// Propagates tool failures, [`VcsError::Unsupported`] when the backend
    /// cannot pull from an explicit source.
    fn pull(&self, source: Option<&str>) -> Result<()>;

    /// Publish local revisions to `target` or the default remote.
    ///
    /// # Errors
    ///
    /// Propagates tool failures, [`VcsError::Unsupported`] for centralized
    /// backends.
    fn push(&self, target: Option<&str>) -> Result<()>;

    /// Switch the working copy to `rev`.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn checkout(&self, rev: &str) -> Result<()>;

    /// Write the content of `name` at `rev` to `dest`.
    ///
    /// [`Revision::Index`] copies the working file. The destination is
    /// replaced atomically.
    ///
    /// # Errors
    ///
    /// Propagates tool and filesystem failures.
    fn extract_file(&self, rev: &Revision, name: &str, dest: &Path) -> Result<()> {
        let content = match rev.spec(self.kind()) {
            None => fs::read(self.root().join(name))?,
            Some(spec) => self.file_content(&spec, name)?,
        };
        write_atomic(dest, &content)
    }

    /// Content of `name` at revision `spec`.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn file_content(&self, spec: &str, name: &str) -> Result<Vec<u8>>;

    /// Every path that is not in sync, relative to the root.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn status_all_files(&self) -> Result<StatusMap>;

    /// Status of the whole repository, possibly cheaper than
    /// [`VcsBackend::status_all_files`].
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn status_root(&self) -> Result<Status> {
        Ok(root_status(&self.status_all_files()?))
    }

    /// Paths excluded through ignore rules.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn ignored_files(&self) -> Result<BTreeSet<String>>;

    /// Sync state against the configured remote, using local data only.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn remote_status(&self) -> Result<RemoteStatus>;

    /// Current branch.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn branch(&self) -> Result<Branch>;

    /// Log entries for `rev` (single revision) or the history of the
    /// working copy limited to `files` and `max` entries.
    ///
    /// # Errors
    ///
    /// Propagates tool failures and malformed output.
    fn query_log(
        &self,
        rev: Option<&str>,
        files: &[PathBuf],
        max: Option<usize>,
    ) -> Result<Vec<LogEntry>>;

    /// History of the working copy.
    ///
    /// # Errors
    ///
    /// Propagates tool failures and malformed output.
    fn log(&self, files: &[PathBuf], max: Option<usize>) -> Result<Vec<LogEntry>> {
        self.query_log(None, files, max)
    }

    /// Details of a single revision. HEAD of an empty repository yields
    /// `None`.
    ///
    /// # Errors
    ///
    /// [`VcsError::RevisionNotFound`] when nothing matches and
    /// [`VcsError::AmbiguousRevision`] when several revisions do.
    fn info(&self, rev: &Revision) -> Result<Option<LogEntry>> {
        let Some(spec) = rev.spec(self.kind()) else {
            return Ok(None);
        };
        let mut entries = match self.query_log(Some(&spec), &[], None) {
            Ok(entries) => entries,
            Err(VcsError::ExternalTool { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        match entries.len() {
            0 if rev.is_head(self.kind()) => Ok(None),
            0 => Err(VcsError::RevisionNotFound(spec)),
            1 => Ok(entries.pop()),
            _ => Err(VcsError::AmbiguousRevision(spec)),
        }
    }

    /// Files tracked at `rev`.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn files(&self, rev: &Revision) -> Result<Vec<String>>;

    /// URL of the default remote.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn remote_url(&self) -> Result<Option<String>>;

    /// Canonical identifier of `rev`; `None` for the index or an empty
    /// repository.
    ///
    /// # Errors
    ///
    /// Same as [`VcsBackend::info`].
    fn revision_id(&self, rev: &Revision) -> Result<Option<String>> {
        Ok(self.info(rev)?.map(|entry| entry.revid))
    }

    /// Unified diff of the working copy against `rev` (default: last
    /// revision), limited to `files`.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn diff(&self, rev: Option<&Revision>, files: &[PathBuf]) -> Result<String>;

    /// The tool's own log output.
    ///
    /// # Errors
    ///
    /// Propagates tool failures.
    fn raw_log(&self, files: &[PathBuf]) -> Result<String>;
}

/// Instantiate the backend for `kind` rooted at `root`.
#[must_use]
pub fn open(kind: BackendKind, root: &Path, runner: Arc<dyn ProcessRunner>) -> Arc<dyn VcsBackend> {
    let tool = Tool::new(kind, root, runner);
    match kind {
        BackendKind::Git => Arc::new(Git::new(tool)),
        BackendKind::Hg => Arc::new(Hg::new(tool)),
        BackendKind::Bzr => Arc::new(Bzr::new(tool)),
        BackendKind::Svn => Arc::new(Svn::new(tool)),
    }
}

/// Runs one backend's executable in the repository root.
#[derive(Clone)]
pub(crate) struct Tool {
    kind: BackendKind,
    root: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("kind", &self.kind)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Tool {
    pub(crate) fn new(kind: BackendKind, root: &Path, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            kind,
            root: root.to_path_buf(),
            runner,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn invocation(&self, args: Args) -> Invocation {
        Invocation::new(self.kind.program(), args.0, &self.root)
    }

    pub(crate) fn run(&self, invocation: &Invocation) -> Result<Vec<u8>> {
        self.runner.run(invocation)
    }

    /// Captured stdout as raw bytes.
    pub(crate) fn bytes(&self, args: Args) -> Result<Vec<u8>> {
        self.run(&self.invocation(args))
    }

    /// Captured stdout as text with one trailing newline removed.
    pub(crate) fn text(&self, args: Args) -> Result<String> {
        let output = self.bytes(args)?;
        let mut text = String::from_utf8_lossy(&output).into_owned();
        if text.ends_with('\n') {
            text.pop();
        }
        Ok(text)
    }

    /// Run for side effects only.
    pub(crate) fn quiet(&self, args: Args) -> Result<()> {
        self.run(&self.invocation(args).discard()).map(|_| ())
    }
}

/// Argument list builder.
#[derive(Debug, Default, Clone)]
pub(crate) struct Args(Vec<OsString>);

impl Args {
    pub(crate) fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self(args.into_iter().map(|arg| arg.as_ref().to_owned()).collect())
    }

    #[must_use]
    pub(crate) fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.0.push(arg.as_ref().to_owned());
        self
    }

    #[must_use]
    pub(crate) fn opt(self, flag: &str, value: Option<impl AsRef<OsStr>>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    #[must_use]
    pub(crate) fn maybe(self, arg: Option<impl AsRef<OsStr>>) -> Self {
        match arg {
            Some(arg) => self.arg(arg),
            None => self,
        }
    }

    /// Append `-- files...` when `files` is not empty.
    #[must_use]
    pub(crate) fn files(mut self, files: &[PathBuf]) -> Self {
        if !files.is_empty() {
            self.0.push("--".into());
            self.0.extend(files.iter().map(|file| file.as_os_str().to_owned()));
        }
        self
    }
}

/// Replace `dest` with `content` through a temporary file in the same
/// directory.
pub(crate) fn write_atomic(dest: &Path, content: &[u8]) -> Result<()> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Replace control characters with spaces.
pub(crate) fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Split NUL-separated output, dropping empty records.
pub(crate) fn split_nul(output: &[u8]) -> impl Iterator<Item = String> + '_ {
    output
        .split(|byte| *byte == 0)
        .filter(|record| !record.is_empty())
        .map(|record| String::from_utf8_lossy(record).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_parsing() {
        assert_eq!("INDEX".parse::<Revision>(), Ok(Revision::Index));
        assert_eq!("HEAD".parse::<Revision>(), Ok(Revision::Head));
        assert_eq!(" abc1234 ".parse::<Revision>(), Ok(Revision::Id("abc1234".into())));
    }

    #[test]
    fn test_head_aliases() {
        assert_eq!(Revision::Head.spec(BackendKind::Hg).as_deref(), Some("tip"));
        assert_eq!(Revision::Head.spec(BackendKind::Bzr).as_deref(), Some("last:1"));
        assert!(Revision::Id("tip".into()).is_head(BackendKind::Hg));
        assert!(!Revision::Id("tip".into()).is_head(BackendKind::Git));
        assert_eq!(Revision::Index.spec(BackendKind::Git), None);
    }

    #[test]
    fn test_args_files_separator() {
        let args = Args::new(["add"]).files(&[PathBuf::from("a b.txt")]);
        assert_eq!(args.0, vec![OsString::from("add"), "--".into(), "a b.txt".into()]);
        assert_eq!(Args::new(["add"]).files(&[]).0.len(), 1);
    }

    #[test]
    fn test_write_atomic_replaces_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let dest = dir.path().join("out.txt");
        fs::write(&dest, "old")?;
        write_atomic(&dest, b"new")?;
        assert_eq!(fs::read_to_string(&dest)?, "new");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_sanitize_control_chars() {
        assert_eq!(sanitize("a\tb\u{1b}c"), "a b c");
    }

    #[test]
    fn test_marker_order() {
        let markers: Vec<_> = BackendKind::ALL.iter().map(|kind| kind.marker()).collect();
        assert_eq!(markers, [".git", ".hg", ".bzr", ".svn"]);
    }
}
