//! Repository root discovery.
//!
//! Walks upward from a path looking for the marker directory of an enabled
//! backend. Symlinked directories met on the way are followed to their real
//! location and remembered, so the root state can later refresh entries that
//! are reachable through them.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::backend::BackendKind;
use crate::error::{Result, VcsError};

/// Outcome of a successful root lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Repository root (symlink free from the last followed link upward).
    pub root: PathBuf,
    /// The backend's metadata directory inside `root`.
    pub marker_dir: PathBuf,
    /// Backend owning the marker.
    pub kind: BackendKind,
    /// Symlinks crossed while walking upward.
    pub links: BTreeSet<PathBuf>,
    /// The resolved path, pointing at the same entry as the input.
    pub real_path: PathBuf,
}

/// First marker of `enabled` present in `dir`, in the order given.
#[must_use]
pub fn marker_in(dir: &Path, enabled: &[BackendKind]) -> Option<(PathBuf, BackendKind)> {
    enabled.iter().find_map(|kind| {
        let marker = dir.join(kind.marker());
        marker.exists().then_some((marker, *kind))
    })
}

/// Find the repository containing `path`.
///
/// Returns `Ok(None)` when no ancestor carries a marker of an enabled
/// backend.
///
/// # Errors
///
/// [`VcsError::SymlinkCycle`] when symlink resolution loops, other
/// filesystem errors as [`VcsError::Io`].
pub fn resolve(path: &Path, enabled: &[BackendKind]) -> Result<Option<Resolution>> {
    if enabled.is_empty() {
        return Ok(None);
    }

    let path = std::path::absolute(path)?;
    let mut links = BTreeSet::new();
    let mut targets = HashSet::new();
    let mut real_path = path.clone();
    let mut current = path;

    loop {
        if current.is_symlink() {
            let relative = real_path
                .strip_prefix(&current)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let target = fs::canonicalize(&current).map_err(|e| cycle_or_io(&current, e))?;
            if !targets.insert(target.clone()) {
                return Err(VcsError::SymlinkCycle(current));
            }
            trace!(link = %current.display(), target = %target.display(), "Following symlink");
            links.insert(current);
            real_path = if relative.as_os_str().is_empty() {
                target.clone()
            } else {
                target.join(relative)
            };
            current = target;
        }

        if let Some((marker_dir, kind)) = marker_in(&current, enabled) {
            return Ok(Some(Resolution {
                root: current,
                marker_dir,
                kind,
                links,
                real_path,
            }));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok(None),
        }
    }
}

fn cycle_or_io(path: &Path, error: io::Error) -> VcsError {
    if error.raw_os_error() == Some(libc::ELOOP) {
        VcsError::SymlinkCycle(path.to_path_buf())
    } else {
        VcsError::Io(error)
    }
}

/// `path` relative to `root` with forward slashes, `None` outside `root`.
#[must_use]
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    Some(
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    const GIT: &[BackendKind] = &[BackendKind::Git];

    fn canonical(dir: &TempDir) -> PathBuf {
        fs::canonicalize(dir.path()).expect("canonical tempdir")
    }

    #[test]
    fn test_nested_roots_resolve_to_innermost() -> Result<()> {
        let dir = TempDir::new()?;
        let base = canonical(&dir);
        fs::create_dir_all(base.join("repo/.git"))?;
        fs::create_dir_all(base.join("repo/sub/.git"))?;
        fs::create_dir_all(base.join("repo/sub/deep"))?;

        let found = resolve(&base.join("repo/sub/deep"), GIT)?.expect("repository");
        assert_eq!(found.root, base.join("repo/sub"));
        assert_eq!(found.marker_dir, base.join("repo/sub/.git"));
        assert!(found.links.is_empty());
        assert_eq!(found.real_path, base.join("repo/sub/deep"));
        Ok(())
    }

    #[test]
    fn test_no_repository() -> Result<()> {
        let dir = TempDir::new()?;
        let base = canonical(&dir);
        fs::create_dir_all(base.join("plain/.git"))?;
        fs::create_dir_all(base.join("plain/inner"))?;

        assert!(resolve(&base.join("plain/inner"), &[])?.is_none());
        assert!(resolve(&base.join("plain/inner"), &[BackendKind::Bzr])?.is_none());
        Ok(())
    }

    #[test]
    fn test_disabled_backend_is_ignored() -> Result<()> {
        let dir = TempDir::new()?;
        let base = canonical(&dir);
        fs::create_dir_all(base.join("repo/.hg"))?;
        fs::create_dir_all(base.join("repo/.git"))?;

        let found = resolve(&base.join("repo"), &[BackendKind::Hg])?.expect("repository");
        assert_eq!(found.kind, BackendKind::Hg);

        let found = resolve(&base.join("repo"), &BackendKind::ALL)?.expect("repository");
        assert_eq!(found.kind, BackendKind::Git);
        Ok(())
    }

    #[test]
    fn test_symlink_is_recorded() -> Result<()> {
        let dir = TempDir::new()?;
        let base = canonical(&dir);
        fs::create_dir_all(base.join("repo/.git"))?;
        fs::create_dir_all(base.join("repo/docs"))?;
        symlink(base.join("repo/docs"), base.join("data"))?;

        let found = resolve(&base.join("data"), GIT)?.expect("repository");
        assert_eq!(found.root, base.join("repo"));
        assert_eq!(found.real_path, base.join("repo/docs"));
        assert!(found.links.contains(&base.join("data")));
        Ok(())
    }

    #[test]
    fn test_symlink_suffix_is_carried() -> Result<()> {
        let dir = TempDir::new()?;
        let base = canonical(&dir);
        fs::create_dir_all(base.join("repo/.git"))?;
        fs::create_dir_all(base.join("repo/docs/api"))?;
        fs::create_dir_all(base.join("outside"))?;
        symlink(base.join("repo/docs"), base.join("outside/link"))?;

        let found = resolve(&base.join("outside/link/api"), GIT)?.expect("repository");
        assert_eq!(found.real_path, base.join("repo/docs/api"));
        assert_eq!(found.links.len(), 1);
        Ok(())
    }

    #[test]
    fn test_symlink_loop_fails_fast() -> Result<()> {
        let dir = TempDir::new()?;
        let base = canonical(&dir);
        symlink(base.join("b"), base.join("a"))?;
        symlink(base.join("a"), base.join("b"))?;

        let result = resolve(&base.join("a"), GIT);
        assert!(matches!(result, Err(VcsError::SymlinkCycle(_))));
        Ok(())
    }

    #[test]
    fn test_relative_key() {
        let root = Path::new("/r");
        assert_eq!(relative_key(root, Path::new("/r/a/b")).as_deref(), Some("a/b"));
        assert_eq!(relative_key(root, Path::new("/r")).as_deref(), Some(""));
        assert_eq!(relative_key(root, Path::new("/elsewhere")), None);
    }
}
