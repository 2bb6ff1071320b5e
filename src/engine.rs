//! The VCS engine: association of registry entries with repositories, and
//! the refresh and invalidation of cached statuses.
//!
//! ```text
//!   check(id) ──► reinitialize? ──► associate ──► resolve ──► RootState (one per root)
//!   refresh(root) ──► update_root ──ok──► update_tree(purge = false)
//!                           └────err───► update_tree(purge = true)
//! ```
//!
//! Everything here may run subprocesses through the backends and is meant
//! for the refresh worker or for CLI commands, never for a UI thread.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{Level, debug, span, warn};

use crate::backend::{self, BackendKind};
use crate::config::{Enablement, VcsConfig};
use crate::error::{Result, VcsError};
use crate::process::{ProcessRunner, SystemRunner};
use crate::registry::{Entry, EntryId, Registry};
use crate::repo::resolve::{marker_in, relative_key};
use crate::repo::{RepositoryHandle, RootState, resolve};
use crate::status::{RemoteStatus, Status};

/// Result of [`Engine::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The association is still valid.
    Unchanged,
    /// The entry was associated again and now belongs elsewhere.
    Reinitialized,
}

/// Owns the settings, the process runner and the registry.
pub struct Engine {
    config: VcsConfig,
    enabled: Vec<BackendKind>,
    runner: Arc<dyn ProcessRunner>,
    registry: Arc<Registry>,
    // Serializes association so concurrent callers never elect two root
    // states for one root.
    association: Mutex<()>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("enabled", &self.enabled)
            .field("entries", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine using `runner` for every tool invocation.
    #[must_use]
    pub fn new(config: VcsConfig, runner: Arc<dyn ProcessRunner>, registry: Arc<Registry>) -> Self {
        let enabled = config.enabled_backends();
        Self {
            config,
            enabled,
            runner,
            registry,
            association: Mutex::new(()),
        }
    }

    /// Engine spawning the real tools with the configured timeout.
    #[must_use]
    pub fn with_system_runner(config: VcsConfig, registry: Arc<Registry>) -> Self {
        let runner = Arc::new(SystemRunner::new(config.command_timeout()));
        Self::new(config, runner, registry)
    }

    /// Settings the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &VcsConfig {
        &self.config
    }

    /// Registry shared with the UI.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn lock_association(&self) -> MutexGuard<'_, ()> {
        self.association
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle of the entry, associating it on first use.
    pub fn handle(&self, id: EntryId) -> Option<RepositoryHandle> {
        if let Some(handle) = self.registry.entry(id)?.vcs {
            return Some(handle);
        }
        self.associate(id)
    }

    /// Associate the entry with its repository, if not done yet.
    pub fn associate(&self, id: EntryId) -> Option<RepositoryHandle> {
        let _guard = self.lock_association();
        self.associate_locked(id)
    }

    fn associate_locked(&self, id: EntryId) -> Option<RepositoryHandle> {
        let entry = self.registry.entry(id)?;
        if let Some(handle) = entry.vcs {
            return Some(handle);
        }
        let handle = self.build_handle(&entry);
        self.registry.update(id, |entry| entry.vcs = Some(handle.clone()));
        Some(handle)
    }

    /// Drop the entry's association and build it again.
    pub fn reinitialize(&self, id: EntryId) -> Option<RepositoryHandle> {
        let _guard = self.lock_association();
        self.registry.update(id, |entry| entry.vcs = None);
        self.associate_locked(id)
    }

    fn build_handle(&self, entry: &Entry) -> RepositoryHandle {
        let mut handle = RepositoryHandle::untracked(&entry.path);
        let resolution = match resolve(&entry.path, &self.enabled) {
            Ok(Some(resolution)) => resolution,
            Ok(None) => return handle,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "Repository discovery failed");
                return handle;
            }
        };

        handle.real_path.clone_from(&resolution.real_path);
        handle.root = Some(resolution.root.clone());
        handle.marker_dir = Some(resolution.marker_dir.clone());
        handle.kind = Some(resolution.kind);
        handle.is_root = entry.path == resolution.root;
        handle.is_root_link = entry.is_link && entry.realpath == resolution.root;

        if handle.is_root {
            let kind = resolution.kind;
            let backend = backend::open(kind, &resolution.root, Arc::clone(&self.runner));
            let state = Arc::new(RootState::new(
                resolution.root.clone(),
                resolution.marker_dir.clone(),
                backend,
                self.config.enablement(kind) == Enablement::Enabled,
                self.config.show_ignored,
            ));
            state.merge_links(&resolution.links);
            debug!(root = %resolution.root.display(), %kind, "New repository root");

            handle.root_id = Some(entry.id);
            handle.state = Some(state);
            handle.track = true;
            if !is_readable(&resolution.marker_dir) {
                let error = VcsError::RepositoryUnreadable(resolution.marker_dir.clone());
                warn!(error = %error, "Marking repository status unknown");
                self.registry.update(entry.id, |entry| {
                    entry.vcs_status = Some(Status::Unknown);
                    entry.vcs_remote_status = Some(RemoteStatus::Unknown);
                });
            }
            return handle;
        }

        let root_id = self.registry.get_or_insert(&resolution.root);
        if root_id == entry.id {
            warn!(path = %entry.path.display(), "Root entry does not resolve to itself");
            return RepositoryHandle::untracked(&entry.path);
        }
        let Some(root_handle) = self.associate_locked(root_id) else {
            return RepositoryHandle::untracked(&entry.path);
        };
        let Some(state) = root_handle.state.clone() else {
            return RepositoryHandle::untracked(&entry.path);
        };

        state.merge_links(&resolution.links);
        handle.root_id = Some(root_id);
        handle.state = Some(state);
        handle.track = root_handle.track;
        if handle.real_path.starts_with(&resolution.marker_dir) {
            handle.in_repodir = true;
            handle.track = false;
        }
        handle
    }

    /// Re-validate the entry's association.
    ///
    /// Entries inside a marker directory are left alone. Untracked entries,
    /// directories that became a nested repository and entries whose marker
    /// vanished are associated again; a root whose marker vanished is purged
    /// first.
    pub fn check(&self, id: EntryId) -> CheckOutcome {
        let Some(entry) = self.registry.entry(id) else {
            return CheckOutcome::Unchanged;
        };
        if !entry.is_directory {
            return CheckOutcome::Unchanged;
        }
        let Some(handle) = entry.vcs else {
            self.associate(id);
            return CheckOutcome::Reinitialized;
        };
        if handle.in_repodir {
            return CheckOutcome::Unchanged;
        }

        let marker_gone = handle
            .marker_dir
            .as_ref()
            .is_some_and(|marker| !marker.exists());
        let became_root =
            !handle.is_root_pointer() && marker_in(&entry.realpath, &self.enabled).is_some();
        if handle.track && !marker_gone && !became_root {
            return CheckOutcome::Unchanged;
        }

        if marker_gone {
            if let (Some(root_id), Some(marker)) = (handle.root_id, handle.marker_dir.as_ref()) {
                let error = VcsError::RepositoryVanished(marker.clone());
                warn!(error = %error, "Purging repository");
                self.update_tree(root_id, true);
            }
        }

        match self.reinitialize(id) {
            Some(new) if !same_association(&handle, &new) => CheckOutcome::Reinitialized,
            Some(_) if marker_gone || became_root => CheckOutcome::Reinitialized,
            _ => CheckOutcome::Unchanged,
        }
    }

    fn root_state(&self, root_id: EntryId) -> Result<Arc<RootState>> {
        let handle = self
            .handle(root_id)
            .ok_or_else(|| VcsError::NotARepository(PathBuf::new()))?;
        match handle.state {
            Some(state) if handle.is_root => Ok(state),
            _ => Err(VcsError::NotARepository(handle.path)),
        }
    }

    /// Cheap initialization of a root (head, branch, remote, root status).
    ///
    /// # Errors
    ///
    /// Propagates backend failures; the caller purges the root.
    pub fn init_root(&self, root_id: EntryId) -> Result<()> {
        let state = self.root_state(root_id)?;
        let snapshot = state.init_root()?;
        self.registry.update(root_id, |entry| {
            entry.vcs_status = Some(snapshot.status);
            entry.vcs_remote_status = Some(snapshot.remote);
        });
        Ok(())
    }

    /// Full refresh of a root's snapshot.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; the caller purges the root.
    pub fn update_root(&self, root_id: EntryId) -> Result<()> {
        let state = self.root_state(root_id)?;
        let snapshot = state.update_root()?;
        self.registry.update(root_id, |entry| {
            entry.vcs_status = Some(snapshot.status);
            entry.vcs_remote_status = Some(snapshot.remote);
        });
        Ok(())
    }

    /// `update_root` followed by the matching tree update. Returns whether
    /// the refresh succeeded.
    pub fn refresh(&self, root_id: EntryId) -> bool {
        match self.update_root(root_id) {
            Ok(()) => {
                self.update_tree(root_id, false);
                true
            }
            Err(e) => {
                warn!(error = %e, "Repository refresh failed");
                self.update_tree(root_id, true);
                false
            }
        }
    }

    /// Whether the root needs a refresh.
    #[must_use]
    pub fn is_outdated(&self, state: &RootState) -> bool {
        !self.config.check_outdated || state.is_outdated()
    }

    /// Push the root's statuses into every loaded entry below the root and
    /// below its links. With `purge`, clear them and associate everything
    /// again instead.
    pub fn update_tree(&self, root_id: EntryId, purge: bool) {
        let Some(state) = self.handle(root_id).and_then(|handle| handle.state) else {
            return;
        };
        let span = span!(Level::DEBUG, "update_tree", root = %state.root().display(), purge);
        let _guard = span.enter();

        let mut purged = Vec::new();
        if purge {
            purged.extend(self.purge_walk(root_id, &state));
        } else {
            self.walk(root_id);
        }

        let root_entry = self.registry.entry(root_id);
        for link in state.links() {
            let Some(link_id) = self.registry.lookup(&link) else {
                debug!(link = %link.display(), "Dropping link without entry");
                state.remove_link(&link);
                continue;
            };
            if purge {
                purged.extend(self.purge_walk(link_id, &state));
                clear_status(&self.registry, link_id);
                purged.push(link_id);
            } else {
                self.walk(link_id);
                let points_at_root = self
                    .handle(link_id)
                    .is_some_and(|handle| handle.is_root_link && handle.root.as_deref() == Some(state.root()));
                if let (true, Some(root_entry)) = (points_at_root, root_entry.as_ref()) {
                    self.registry.update(link_id, |entry| {
                        entry.vcs_status = root_entry.vcs_status;
                        entry.vcs_remote_status = root_entry.vcs_remote_status;
                    });
                }
            }
        }

        if purge {
            clear_status(&self.registry, root_id);
            self.reinitialize(root_id);
            for id in purged {
                self.reinitialize(id);
            }
        }
    }

    fn walk(&self, start: EntryId) {
        let mut stack = vec![start];
        while let Some(dir_id) = stack.pop() {
            let Some(dir) = self.registry.entry(dir_id) else {
                continue;
            };
            let Some(dir_handle) = self.handle(dir_id) else {
                continue;
            };
            if !dir_handle.track {
                continue;
            }
            let Some(children) = dir.children else {
                continue;
            };

            let mut has_vcs_child = false;
            for child_id in children {
                let Some(child) = self.registry.entry(child_id) else {
                    continue;
                };

                if child.is_directory {
                    self.check(child_id);
                    let Some(handle) = self.handle(child_id) else {
                        continue;
                    };
                    if !handle.track {
                        continue;
                    }
                    if handle.is_root_pointer() {
                        has_vcs_child = true;
                        continue;
                    }
                    let status = handle.status(true);
                    self.registry.update(child_id, |entry| entry.vcs_status = status);
                    // Linked directories are walked from their own root's links
                    if child.children.is_some() && !child.is_link {
                        stack.push(child_id);
                    }
                } else {
                    let status = dir_handle.state.as_ref().map(|state| {
                        state.status_of(&dir_handle.real_path.join(child.basename()), false)
                    });
                    self.registry.update(child_id, |entry| entry.vcs_status = status);
                }
            }
            self.registry
                .update(dir_id, |entry| entry.has_vcs_child = has_vcs_child);
        }
    }

    /// Clear statuses below `start` and collect the directories whose
    /// association must be rebuilt. Nested repositories and symlinks into
    /// other repositories are left alone, and links are never descended.
    fn purge_walk(&self, start: EntryId, state: &Arc<RootState>) -> Vec<EntryId> {
        let mut purged = Vec::new();
        let mut stack = vec![start];
        while let Some(dir_id) = stack.pop() {
            for child_id in self.registry.children(dir_id) {
                let Some(child) = self.registry.entry(child_id) else {
                    continue;
                };
                if !child.is_directory {
                    clear_status(&self.registry, child_id);
                    continue;
                }
                let foreign = child.vcs.as_ref().is_some_and(|handle| {
                    (handle.is_root_pointer() || child.is_link)
                        && !handle.state.as_ref().is_some_and(|own| Arc::ptr_eq(own, state))
                });
                if foreign {
                    continue;
                }
                clear_status(&self.registry, child_id);
                purged.push(child_id);
                if child.children.is_some() && !child.is_link {
                    stack.push(child_id);
                }
            }
        }
        purged
    }

    /// Status of any registered entry from the cached snapshots.
    #[must_use]
    pub fn status_of(&self, id: EntryId) -> Option<Status> {
        let entry = self.registry.entry(id)?;
        if entry.is_directory {
            return self.handle(id)?.status(true);
        }
        let parent = entry.path.parent()?;
        let parent_handle = self.handle(self.registry.get_or_insert(parent))?;
        let state = parent_handle.state.as_ref()?;
        Some(state.status_of(&parent_handle.real_path.join(entry.basename()), false))
    }

    /// Root state of the repository containing `path`, for action commands.
    ///
    /// # Errors
    ///
    /// [`VcsError::NotARepository`] when no enabled backend claims `path`.
    pub fn open(&self, path: &Path) -> Result<Arc<RootState>> {
        let id = self.registry.get_or_insert(path);
        self.handle(id)
            .and_then(|handle| handle.state)
            .ok_or_else(|| VcsError::NotARepository(path.to_path_buf()))
    }

    /// Root-relative key of `path` inside `state`'s repository.
    #[must_use]
    pub fn relative_path(&self, state: &RootState, path: &Path) -> Option<String> {
        let id = self.registry.get_or_insert(path);
        let real = self
            .handle(id)
            .map_or_else(|| path.to_path_buf(), |handle| handle.real_path);
        relative_key(state.root(), &real)
    }
}

fn clear_status(registry: &Registry, id: EntryId) {
    registry.update(id, |entry| {
        entry.vcs_status = None;
        entry.vcs_remote_status = None;
    });
}

fn same_association(old: &RepositoryHandle, new: &RepositoryHandle) -> bool {
    old.root == new.root
        && old.track == new.track
        && old.in_repodir == new.in_repodir
        && old.is_root == new.is_root
}

fn is_readable(marker: &Path) -> bool {
    if marker.is_dir() {
        fs::read_dir(marker).is_ok()
    } else {
        fs::File::open(marker).is_ok()
    }
}
