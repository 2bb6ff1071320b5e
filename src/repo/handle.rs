//! Per-entry repository handles and the root state they share.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::SystemTime;

use tracing::{debug, info};
use walkdir::WalkDir;

use super::resolve::{marker_in, relative_key};
use crate::backend::{BackendKind, Branch, LogEntry, Revision, VcsBackend};
use crate::error::Result;
use crate::registry::EntryId;
use crate::status::{self, RemoteStatus, Status, StatusMap};

/// Immutable view of a root's cached state. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootSnapshot {
    /// Latest revision, `None` for an empty repository or before the first
    /// fetch.
    pub head: Option<LogEntry>,
    /// Checked-out branch.
    pub branch: Branch,
    /// Position relative to the upstream branch.
    pub remote: RemoteStatus,
    /// Status of the repository as a whole; `None` until fetched.
    pub status: Status,
    /// Paths not in sync; `None` until the full status was fetched.
    pub subpaths: Option<StatusMap>,
}

impl RootSnapshot {
    fn unfetched() -> Self {
        Self {
            status: Status::None,
            remote: RemoteStatus::Unknown,
            ..Self::default()
        }
    }

    /// Status of `relpath` (root-relative), `none` while unfetched.
    #[must_use]
    pub fn status_of(&self, relpath: &str, is_directory: bool) -> Status {
        match &self.subpaths {
            None => Status::None,
            Some(map) => status::status_of(map, relpath, is_directory),
        }
    }
}

/// Canonical per-root state shared by every handle under the root.
pub struct RootState {
    root: PathBuf,
    marker_dir: PathBuf,
    backend: Arc<dyn VcsBackend>,
    query_remote: bool,
    show_ignored: bool,
    snapshot: RwLock<Arc<RootSnapshot>>,
    links: Mutex<BTreeSet<PathBuf>>,
    updated_at: Mutex<Option<SystemTime>>,
    initialized: AtomicBool,
}

impl fmt::Debug for RootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootState")
            .field("root", &self.root)
            .field("kind", &self.backend.kind())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RootState {
    /// New, unfetched state for the repository at `root`.
    ///
    /// `query_remote` is off for backends enabled as `local`; their remote
    /// status stays `unknown`.
    #[must_use]
    pub fn new(
        root: PathBuf,
        marker_dir: PathBuf,
        backend: Arc<dyn VcsBackend>,
        query_remote: bool,
        show_ignored: bool,
    ) -> Self {
        Self {
            root,
            marker_dir,
            backend,
            query_remote,
            show_ignored,
            snapshot: RwLock::new(Arc::new(RootSnapshot::unfetched())),
            links: Mutex::new(BTreeSet::new()),
            updated_at: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Repository root, symlinks resolved.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `.git`, `.hg`, `.bzr` or `.svn` under the root.
    #[must_use]
    pub fn marker_dir(&self) -> &Path {
        &self.marker_dir
    }

    /// Backend owning the root.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Backend bound to this root, for action commands.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn VcsBackend> {
        &self.backend
    }

    /// Current snapshot; cheap, never blocks on a refresh in progress.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RootSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: RootSnapshot) -> Arc<RootSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        snapshot
    }

    /// Whether `init_root` or `update_root` ever succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Time of the last successful full update.
    #[must_use]
    pub fn updated_at(&self) -> Option<SystemTime> {
        *lock(&self.updated_at)
    }

    /// Symlinks known to resolve into this repository.
    #[must_use]
    pub fn links(&self) -> BTreeSet<PathBuf> {
        lock(&self.links).clone()
    }

    /// Remember more symlinks leading into this repository.
    pub fn merge_links(&self, links: &BTreeSet<PathBuf>) {
        if !links.is_empty() {
            lock(&self.links).extend(links.iter().cloned());
        }
    }

    /// Forget a symlink that no longer leads here.
    pub fn remove_link(&self, link: &Path) {
        lock(&self.links).remove(link);
    }

    fn remote(&self) -> Result<RemoteStatus> {
        if self.query_remote {
            self.backend.remote_status()
        } else {
            Ok(RemoteStatus::Unknown)
        }
    }

    /// Cheap initialization: head, branch, remote status and the root
    /// status, without the per-path map.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; the published snapshot is unchanged.
    pub fn init_root(&self) -> Result<Arc<RootSnapshot>> {
        debug!(root = %self.root.display(), kind = %self.kind(), "Initializing root");
        let head = self.backend.info(&Revision::Head)?;
        let branch = self.backend.branch()?;
        let remote = self.remote()?;
        let status = self.backend.status_root()?;

        let previous = self.snapshot();
        let snapshot = self.publish(RootSnapshot {
            head,
            branch,
            remote,
            status,
            subpaths: previous.subpaths.clone(),
        });
        self.initialized.store(true, Ordering::Release);
        Ok(snapshot)
    }

    /// Full refresh including the per-path status map.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; the published snapshot is unchanged and
    /// the caller is expected to purge the root.
    pub fn update_root(&self) -> Result<Arc<RootSnapshot>> {
        let head = self.backend.info(&Revision::Head)?;
        let branch = self.backend.branch()?;
        let mut subpaths = self.backend.status_all_files()?;
        if self.show_ignored {
            for path in self.backend.ignored_files()? {
                subpaths.entry(path).or_insert(Status::Ignored);
            }
        }
        let remote = self.remote()?;
        let status = status::root_status(&subpaths);

        info!(
            root = %self.root.display(),
            kind = %self.kind(),
            %status,
            paths = subpaths.len(),
            "Refreshed repository"
        );

        let snapshot = self.publish(RootSnapshot {
            head,
            branch,
            remote,
            status,
            subpaths: Some(subpaths),
        });
        *lock(&self.updated_at) = Some(SystemTime::now());
        self.initialized.store(true, Ordering::Release);
        Ok(snapshot)
    }

    /// Status of `real_path`, which must lie under the root.
    #[must_use]
    pub fn status_of(&self, real_path: &Path, is_directory: bool) -> Status {
        match relative_key(&self.root, real_path) {
            Some(relpath) => self.snapshot().status_of(&relpath, is_directory),
            None => Status::None,
        }
    }

    /// Whether anything under the root, not crossing into nested
    /// repositories, changed after the last full update.
    ///
    /// The root's own marker directory is part of the walk: index, HEAD and
    /// ref updates from an external `add`, `commit` or `checkout` only touch
    /// files in there.
    #[must_use]
    pub fn is_outdated(&self) -> bool {
        let Some(updated_at) = self.updated_at() else {
            return true;
        };

        let mut walker = WalkDir::new(&self.root).follow_links(false).into_iter();
        while let Some(entry) = walker.next() {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            let nested_root = entry.file_type().is_dir()
                && path != self.root
                && !path.starts_with(&self.marker_dir)
                && marker_in(path, &BackendKind::ALL).is_some();
            if nested_root {
                walker.skip_current_dir();
                continue;
            }
            let modified = entry.metadata().ok().and_then(|meta| meta.modified().ok());
            if modified.is_some_and(|modified| modified > updated_at) {
                debug!(root = %self.root.display(), path = %path.display(), "Root is outdated");
                return true;
            }
        }
        false
    }
}

/// Per-entry association with a repository.
#[derive(Debug, Clone, Default)]
pub struct RepositoryHandle {
    /// Entry path as displayed.
    pub path: PathBuf,
    /// Same location with symlinks resolved.
    pub real_path: PathBuf,
    /// Root of the containing repository, `None` when untracked.
    pub root: Option<PathBuf>,
    /// Marker directory of that root.
    pub marker_dir: Option<PathBuf>,
    /// Backend owning the root.
    pub kind: Option<BackendKind>,
    /// The entry is the root itself.
    pub is_root: bool,
    /// The entry is a symlink resolving to the root.
    pub is_root_link: bool,
    /// The entry is the marker directory or lies inside it.
    pub in_repodir: bool,
    /// Participates in background refresh.
    pub track: bool,
    /// Registry id of the root entry.
    pub root_id: Option<EntryId>,
    /// Shared root state.
    pub state: Option<Arc<RootState>>,
}

impl RepositoryHandle {
    /// Handle for an entry outside any repository.
    #[must_use]
    pub fn untracked(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            real_path: path.to_path_buf(),
            ..Self::default()
        }
    }

    /// The entry is the root or a symlink to it.
    #[must_use]
    pub const fn is_root_pointer(&self) -> bool {
        self.is_root || self.is_root_link
    }

    /// Status of the entry from the published snapshot. Root pointers get
    /// the repository status.
    #[must_use]
    pub fn status(&self, is_directory: bool) -> Option<Status> {
        let state = self.state.as_ref()?;
        if self.is_root_pointer() {
            return Some(state.snapshot().status);
        }
        Some(state.status_of(&self.real_path, is_directory))
    }

    /// Whether both handles share the same root state.
    #[must_use]
    pub fn same_root(&self, other: &Self) -> bool {
        match (&self.state, &other.state) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{self, BackendKind};
    use crate::test_utils::fixtures::ScriptedRunner;
    use filetime::{FileTime, set_file_mtime};
    use std::fs;
    use tempfile::TempDir;

    fn state(dir: &TempDir, runner: Arc<ScriptedRunner>) -> RootState {
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join(".git")).expect("marker");
        let backend = backend::open(BackendKind::Git, &root, runner);
        RootState::new(root.clone(), root.join(".git"), backend, true, false)
    }

    #[test]
    fn test_unfetched_snapshot_reports_none() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let state = state(&dir, Arc::new(ScriptedRunner::default()));
        assert_eq!(state.snapshot().status, Status::None);
        assert_eq!(state.status_of(&dir.path().join("a.txt"), false), Status::None);
        assert!(!state.is_initialized());
        assert!(state.is_outdated());
        Ok(())
    }

    #[test]
    fn test_update_root_publishes_map() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = Arc::new(ScriptedRunner::default());
        runner.respond("status --porcelain", " M src/lib.rs\n?? notes.txt\n");
        let state = state(&dir, Arc::clone(&runner));

        let before = state.snapshot();
        let after = state.update_root()?;
        assert_eq!(after.status, Status::Untracked);
        assert_eq!(state.status_of(&dir.path().join("src"), true), Status::Changed);
        assert_eq!(state.status_of(&dir.path().join("README"), false), Status::Sync);
        assert_eq!(before.status, Status::None);
        assert!(state.is_initialized());
        assert_eq!(after.branch, Branch::Detached);
        Ok(())
    }

    #[test]
    fn test_failed_update_keeps_snapshot() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = Arc::new(ScriptedRunner::default());
        runner.fail("status --porcelain", "fatal: index file corrupt");
        let state = state(&dir, Arc::clone(&runner));

        assert!(state.update_root().is_err());
        assert_eq!(state.snapshot().subpaths, None);
        assert!(!state.is_initialized());
        Ok(())
    }

    #[test]
    fn test_outdated_after_modification() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let state = state(&dir, Arc::new(ScriptedRunner::default()));
        let file = dir.path().join("tracked.txt");
        fs::write(&file, "x")?;
        let old = FileTime::from_unix_time(1_000_000, 0);
        for path in [file.clone(), dir.path().join(".git"), dir.path().to_path_buf()] {
            set_file_mtime(&path, old)?;
        }

        state.update_root()?;
        assert!(!state.is_outdated());

        let later = FileTime::from_system_time(SystemTime::now() + std::time::Duration::from_secs(60));
        set_file_mtime(&file, later)?;
        assert!(state.is_outdated());
        Ok(())
    }

    #[test]
    fn test_index_change_is_outdated() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let state = state(&dir, Arc::new(ScriptedRunner::default()));
        let index = dir.path().join(".git/index");
        fs::write(&index, "index")?;

        let old = FileTime::from_unix_time(1_000_000, 0);
        for path in [index.clone(), dir.path().join(".git"), dir.path().to_path_buf()] {
            set_file_mtime(&path, old)?;
        }
        state.update_root()?;
        assert!(!state.is_outdated());

        // Staging only rewrites the index; the working tree is untouched
        let later = FileTime::from_system_time(SystemTime::now() + std::time::Duration::from_secs(60));
        set_file_mtime(&index, later)?;
        assert!(state.is_outdated());
        Ok(())
    }

    #[test]
    fn test_default_snapshot_is_unfetched() {
        let snapshot = RootSnapshot::default();
        assert_eq!(snapshot.status, Status::None);
        assert_eq!(snapshot.status_of("a.txt", false), Status::None);
    }

    #[test]
    fn test_nested_repository_changes_are_ignored() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let state = state(&dir, Arc::new(ScriptedRunner::default()));
        let nested = dir.path().join("vendor");
        fs::create_dir_all(nested.join(".hg"))?;
        fs::write(nested.join("lib.c"), "x")?;

        let old = FileTime::from_unix_time(1_000_000, 0);
        for path in [dir.path().to_path_buf(), dir.path().join(".git"), nested.clone(), nested.join(".hg")] {
            set_file_mtime(&path, old)?;
        }
        state.update_root()?;

        let later = FileTime::from_system_time(SystemTime::now() + std::time::Duration::from_secs(60));
        set_file_mtime(nested.join("lib.c"), later)?;
        assert!(!state.is_outdated());
        Ok(())
    }

    #[test]
    fn test_links_merge_and_remove() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let state = state(&dir, Arc::new(ScriptedRunner::default()));
        let links: BTreeSet<PathBuf> = [PathBuf::from("/data"), PathBuf::from("/other")].into();
        state.merge_links(&links);
        state.remove_link(Path::new("/other"));
        assert_eq!(state.links(), [PathBuf::from("/data")].into());
        Ok(())
    }
}
