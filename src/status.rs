//! Canonical status vocabulary and the aggregation rules built on it.
//!
//! Every backend translates its tool-specific codes into [`Status`]. A
//! repository keeps a [`StatusMap`] of root-relative paths that are *not* in
//! sync; directory and root statuses are derived from that map by picking the
//! most severe status found, following [`Status::PRIORITY`].
//!
//! ```text
//! conflict > untracked > deleted > changed > staged > sync > unknown
//! ```
//!
//! `ignored` and `none` can be stored for exact lookups but never bubble up
//! into a directory status.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Root-relative path (forward slashes, no trailing slash) to its status.
pub type StatusMap = BTreeMap<String, Status>;

/// Canonical per-path status shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Status {
    /// Unresolved merge conflict.
    Conflict,
    /// Not tracked by the repository.
    Untracked,
    /// Tracked but missing from the working tree.
    Deleted,
    /// Modified in the working tree and not staged.
    Changed,
    /// Recorded in the index, waiting for a commit.
    Staged,
    /// Excluded through the backend's ignore rules.
    Ignored,
    /// Identical to the last revision.
    Sync,
    /// Nothing to report (untracked empty directory, status not fetched yet).
    #[default]
    None,
    /// The backend reported a code we do not understand.
    Unknown,
}

impl Status {
    /// Statuses that propagate to directories, most severe first.
    pub const PRIORITY: [Self; 7] = [
        Self::Conflict,
        Self::Untracked,
        Self::Deleted,
        Self::Changed,
        Self::Staged,
        Self::Sync,
        Self::Unknown,
    ];

    /// Every status, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Conflict,
        Self::Untracked,
        Self::Deleted,
        Self::Changed,
        Self::Staged,
        Self::Ignored,
        Self::Sync,
        Self::None,
        Self::Unknown,
    ];

    /// Position in [`Status::PRIORITY`] (0 is the most severe), `None` for
    /// statuses that never propagate to a parent directory.
    #[must_use]
    pub fn severity(self) -> Option<usize> {
        Self::PRIORITY.iter().position(|status| *status == self)
    }

    /// Lowercase name used in output and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::Untracked => "untracked",
            Self::Deleted => "deleted",
            Self::Changed => "changed",
            Self::Staged => "staged",
            Self::Ignored => "ignored",
            Self::Sync => "sync",
            Self::None => "none",
            Self::Unknown => "unknown",
        }
    }

    /// Single-character marker for short listings.
    #[must_use]
    pub const fn marker(self) -> char {
        match self {
            Self::Conflict => '!',
            Self::Untracked => '?',
            Self::Deleted => '-',
            Self::Changed => '*',
            Self::Staged => '+',
            Self::Ignored => '·',
            Self::Sync => ' ',
            Self::None => ' ',
            Self::Unknown => '~',
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status: {s}"))
    }
}

/// Sync state of the current branch against its remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RemoteStatus {
    /// Local and remote point at the same revision.
    Sync,
    /// Local has revisions the remote lacks.
    Ahead,
    /// Remote has revisions the local branch lacks.
    Behind,
    /// Both sides have revisions the other lacks.
    Diverged,
    /// No remote is configured.
    None,
    /// A remote exists but its state was not queried.
    #[default]
    Unknown,
}

impl RemoteStatus {
    /// Lowercase name used in output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Ahead => "ahead",
            Self::Behind => "behind",
            Self::Diverged => "diverged",
            Self::None => "none",
            Self::Unknown => "unknown",
        }
    }

    /// Derive the remote status from "has local-only" and "has remote-only"
    /// revision flags.
    #[must_use]
    pub const fn from_divergence(ahead: bool, behind: bool) -> Self {
        match (ahead, behind) {
            (true, true) => Self::Diverged,
            (true, false) => Self::Ahead,
            (false, true) => Self::Behind,
            (false, false) => Self::Sync,
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the most severe propagating status of `statuses`, or
/// [`Status::Sync`] when none of them propagates.
pub fn aggregate<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    statuses
        .into_iter()
        .filter_map(|status| status.severity().map(|rank| (rank, status)))
        .min_by_key(|(rank, _)| *rank)
        .map_or(Status::Sync, |(_, status)| status)
}

/// Status of the whole repository described by `map`.
#[must_use]
pub fn root_status(map: &StatusMap) -> Status {
    aggregate(map.values().copied())
}

/// Status of `relpath` inside the repository described by `map`.
///
/// An exact entry for the path or any of its ancestors wins (innermost
/// first). Directories otherwise take the most severe status among the
/// entries below them. The empty relpath designates the root itself.
#[must_use]
pub fn status_of(map: &StatusMap, relpath: &str, is_directory: bool) -> Status {
    let relpath = normalize_subpath(relpath);
    if relpath.is_empty() {
        return if is_directory {
            root_status(map)
        } else {
            Status::Sync
        };
    }

    let mut candidate = relpath.as_str();
    loop {
        if let Some(status) = map.get(candidate) {
            return *status;
        }
        match candidate.rfind('/') {
            Some(idx) => candidate = &candidate[..idx],
            None => break,
        }
    }

    if is_directory {
        let prefix = format!("{relpath}/");
        return aggregate(
            map.range(prefix.clone()..)
                .take_while(|(path, _)| path.starts_with(&prefix))
                .map(|(_, status)| *status),
        );
    }

    Status::Sync
}

/// Normalize a backend-reported path into a [`StatusMap`] key: forward
/// slashes, no `./` prefix, no empty or `.` components, no trailing slash.
#[must_use]
pub fn normalize_subpath(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Insert `status` for `path`, dropping in-sync entries so the map only
/// ever records deviations.
pub fn record(map: &mut StatusMap, path: &str, status: Status) {
    let key = normalize_subpath(path);
    if key.is_empty() || status == Status::Sync {
        return;
    }
    map.insert(key, status);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Status)]) -> StatusMap {
        let mut map = StatusMap::new();
        for (path, status) in entries {
            record(&mut map, path, *status);
        }
        map
    }

    #[test]
    fn test_empty_map_is_sync() {
        assert_eq!(root_status(&StatusMap::new()), Status::Sync);
    }

    #[test]
    fn test_changed_outranks_staged() {
        let map = map(&[("B", Status::Changed), ("C", Status::Staged)]);
        assert_eq!(root_status(&map), Status::Changed);
    }

    #[test]
    fn test_ignored_and_none_do_not_propagate() {
        let map = map(&[("build", Status::Ignored), ("empty", Status::None)]);
        assert_eq!(root_status(&map), Status::Sync);
        assert_eq!(status_of(&map, "build", true), Status::Ignored);
        assert_eq!(status_of(&map, "build/out.o", false), Status::Ignored);
    }

    #[test]
    fn test_directory_takes_most_severe_child() {
        let mut statuses = map(&[("src/new.rs", Status::Untracked)]);
        assert_eq!(status_of(&statuses, "src", true), Status::Untracked);

        record(&mut statuses, "src/merge.rs", Status::Conflict);
        assert_eq!(status_of(&statuses, "src", true), Status::Conflict);
    }

    #[test]
    fn test_prefix_scan_does_not_match_siblings() {
        let map = map(&[("srcfoo/a.rs", Status::Conflict), ("src/b.rs", Status::Staged)]);
        assert_eq!(status_of(&map, "src", true), Status::Staged);
    }

    #[test]
    fn test_ancestor_entry_wins() {
        let map = map(&[("vendor", Status::Untracked), ("vendor/lib/x.c", Status::Conflict)]);
        assert_eq!(status_of(&map, "vendor/lib/y.c", false), Status::Untracked);
        assert_eq!(status_of(&map, "vendor/lib", true), Status::Untracked);
    }

    #[test]
    fn test_file_without_entry_is_sync() {
        let map = map(&[("a.txt", Status::Changed)]);
        assert_eq!(status_of(&map, "b.txt", false), Status::Sync);
        assert_eq!(status_of(&map, "dir", false), Status::Sync);
    }

    #[test]
    fn test_root_relpath_uses_whole_map() {
        let map = map(&[("deep/inside/file", Status::Deleted)]);
        assert_eq!(status_of(&map, "", true), Status::Deleted);
        assert_eq!(status_of(&map, ".", true), Status::Deleted);
    }

    #[test]
    fn test_record_skips_sync_and_strips_slashes() {
        let map = map(&[("clean.txt", Status::Sync), ("dir/", Status::Untracked)]);
        assert!(!map.contains_key("clean.txt"));
        assert_eq!(map.get("dir"), Some(&Status::Untracked));
    }

    #[test]
    fn test_unknown_is_least_severe() {
        assert_eq!(aggregate([Status::Unknown]), Status::Unknown);
        assert_eq!(aggregate([Status::Unknown, Status::Staged]), Status::Staged);
    }

    #[test]
    fn test_status_round_trips_through_names() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
    }

    #[test]
    fn test_remote_divergence() {
        assert_eq!(RemoteStatus::from_divergence(true, true), RemoteStatus::Diverged);
        assert_eq!(RemoteStatus::from_divergence(false, true), RemoteStatus::Behind);
        assert_eq!(RemoteStatus::from_divergence(false, false), RemoteStatus::Sync);
    }
}
