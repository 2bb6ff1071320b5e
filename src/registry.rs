//! Directory registry.
//!
//! An arena of filesystem entries addressed by stable [`EntryId`]s plus a
//! path index. Repository handles refer to their root entry by id, so the
//! registry never holds reference cycles.
//!
//! Both maps are `DashMap`s; callers receive clones of entries and apply
//! changes through [`Registry::update`], so no shard guard outlives a call.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::trace;

use crate::repo::RepositoryHandle;
use crate::status::{RemoteStatus, Status};

/// Stable identifier of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

impl EntryId {
    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A file or directory known to the file manager.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Arena id, stable for the life of the entry.
    pub id: EntryId,
    /// Path as displayed (may cross symlinks).
    pub path: PathBuf,
    /// Path with symlinks resolved.
    pub realpath: PathBuf,
    /// Directory, after following symlinks.
    pub is_directory: bool,
    /// The path itself is a symlink.
    pub is_link: bool,
    /// Shown as a recursive, merged listing.
    pub flattened: bool,
    /// Loaded children, `None` until the directory is loaded.
    pub children: Option<Vec<EntryId>>,
    /// Last published local status.
    pub vcs_status: Option<Status>,
    /// Last published status against the upstream branch.
    pub vcs_remote_status: Option<RemoteStatus>,
    /// A loaded child directory is the root (or a link to the root) of a
    /// repository.
    pub has_vcs_child: bool,
    /// Repository association, created lazily.
    pub vcs: Option<RepositoryHandle>,
}

impl Entry {
    fn from_disk(id: EntryId, path: PathBuf) -> Self {
        let is_link = path.is_symlink();
        let is_directory = path.is_dir();
        let realpath = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        Self {
            id,
            path,
            realpath,
            is_directory,
            is_link,
            flattened: false,
            children: None,
            vcs_status: None,
            vcs_remote_status: None,
            has_vcs_child: false,
            vcs: None,
        }
    }

    /// Final path component, or the whole path for the filesystem root.
    #[must_use]
    pub fn basename(&self) -> &std::ffi::OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }
}

/// Path-indexed arena of entries.
#[derive(Debug, Default)]
pub struct Registry {
    entries: DashMap<EntryId, Entry>,
    by_path: DashMap<PathBuf, EntryId>,
    next_id: AtomicUsize,
}

impl Registry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entry registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the entry registered for `path`.
    #[must_use]
    pub fn lookup(&self, path: &Path) -> Option<EntryId> {
        self.by_path.get(path).map(|id| *id)
    }

    /// Snapshot of the entry.
    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<Entry> {
        self.entries.get(&id).map(|entry| entry.clone())
    }

    /// Id for `path`, registering it on first use.
    ///
    /// Relative paths are made absolute against the working directory;
    /// the path is otherwise kept as given.
    pub fn get_or_insert(&self, path: &Path) -> EntryId {
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        *self.by_path.entry(path.clone()).or_insert_with(|| {
            let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
            trace!(id = id.0, path = %path.display(), "Registering entry");
            self.entries.insert(id, Entry::from_disk(id, path));
            id
        })
    }

    /// Read the directory from disk and register its children.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the directory cannot be listed.
    pub fn load_directory(&self, id: EntryId) -> io::Result<Vec<EntryId>> {
        let Some(entry) = self.entry(id) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "unknown entry"));
        };

        let mut names: Vec<PathBuf> = fs::read_dir(&entry.path)?
            .filter_map(|child| child.ok().map(|child| child.path()))
            .collect();
        names.sort();

        let children: Vec<EntryId> = names.iter().map(|path| self.get_or_insert(path)).collect();
        let kept: HashSet<EntryId> = children.iter().copied().collect();
        for stale in entry.children.iter().flatten().filter(|child| !kept.contains(child)) {
            self.evict(*stale);
        }
        self.update(id, |entry| entry.children = Some(children.clone()));
        Ok(children)
    }

    /// Loaded children, empty when the directory was never loaded.
    #[must_use]
    pub fn children(&self, id: EntryId) -> Vec<EntryId> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.children.clone())
            .unwrap_or_default()
    }

    /// Apply `change` to the entry; returns `false` for an unknown id.
    pub fn update<F>(&self, id: EntryId, change: F) -> bool
    where
        F: FnOnce(&mut Entry),
    {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                change(&mut entry);
                true
            }
            None => false,
        }
    }

    /// Drop the entry and everything loaded below it. Callers fix the
    /// parent's child list.
    fn evict(&self, id: EntryId) -> Option<Entry> {
        let (_, entry) = self.entries.remove(&id)?;
        // A re-registered path has a new id; leave it alone
        self.by_path.remove_if(&entry.path, |_, mapped| *mapped == id);
        trace!(id = id.0, path = %entry.path.display(), "Evicting entry");
        for child in entry.children.iter().flatten() {
            self.evict(*child);
        }
        Some(entry)
    }
}
