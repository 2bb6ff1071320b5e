//! Shared setup for commands that act on one repository: working directory,
//! registry, engine and the handle of the repository containing it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::VcsContext;
use crate::backend::VcsBackend;
use crate::engine::Engine;
use crate::repo::RootState;

/// The repository a command operates on.
pub struct Workspace {
    /// Engine over a fresh registry.
    pub engine: Arc<Engine>,
    /// Root state of the repository containing `cwd`.
    pub state: Arc<RootState>,
    /// Absolute directory the command runs in.
    pub cwd: PathBuf,
}

impl Workspace {
    /// Backend bound to the repository root.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn VcsBackend> {
        self.state.backend()
    }

    /// Turn paths given on the command line into root-relative paths.
    ///
    /// # Errors
    ///
    /// Returns an error for a path outside the repository.
    pub fn root_relative(&self, files: &[String]) -> Result<Vec<PathBuf>> {
        files
            .iter()
            .map(|file| {
                let path = self.cwd.join(file);
                self.engine
                    .relative_path(&self.state, &path)
                    .map(PathBuf::from)
                    .with_context(|| {
                        format!(
                            "{file} is outside the repository at {}",
                            self.state.root().display()
                        )
                    })
            })
            .collect()
    }
}

/// Trait providing common operations for command modules
pub trait CommandContext {
    /// Open the repository containing `dir` (the working directory when
    /// `None`)
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` is not inside a repository of an enabled
    /// backend
    fn open_workspace(&self, dir: Option<&Path>) -> Result<Workspace>;
}

impl CommandContext for VcsContext {
    fn open_workspace(&self, dir: Option<&Path>) -> Result<Workspace> {
        let cwd = match dir {
            Some(dir) => std::path::absolute(dir)
                .with_context(|| format!("Invalid directory: {}", dir.display()))?,
            None => std::env::current_dir().context("Could not determine working directory")?,
        };
        let engine = self.engine();
        let state = engine.open(&cwd)?;
        Ok(Workspace { engine, state, cwd })
    }
}
