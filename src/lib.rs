#![warn(missing_docs)]
// Allow pedantic strict lints that create false positives in this codebase
#![allow(clippy::indexing_slicing)] // Bounds checked by logic

//! # vcstat - Version Control Status Engine
//!
//! vcstat discovers which version-control repository a directory belongs to,
//! queries the repository's command-line tool for per-file and per-directory
//! status, and keeps a cache of those statuses fresh in the background for a
//! multi-column file browser.
//!
//! ## Features
//!
//! - **Four Backends**: git, Mercurial, Bazaar and Subversion behind one
//!   [`backend::VcsBackend`] trait, each enabled, local-only or disabled
//! - **Root Resolution**: nearest marker directory wins, symlinks crossed on
//!   the way are remembered so they can be invalidated with their root
//! - **Status Aggregation**: directories inherit the most severe status below
//!   them, by a fixed priority order
//! - **Background Refresh**: one worker thread, at most one refresh per root
//!   per pass, snapshots published atomically
//!
//! ## Architecture
//!
//! - [`status`]: status codes and aggregation
//! - [`process`]: subprocess runner with process groups and timeouts
//! - [`backend`]: the per-tool adapters
//! - [`repo`]: root resolution, root state and per-entry handles
//! - [`registry`]: the arena of directory entries
//! - [`engine`]: association, refresh and invalidation
//! - [`scheduler`]: the background refresh worker
//! - [`config`]: configuration parsing and validation
//!
//! ## Example Usage
//!
//! ```no_run
//! use vcstat::VcsContext;
//!
//! # fn main() -> anyhow::Result<()> {
//! let ctx = VcsContext::new()?;
//! let engine = ctx.engine();
//! let state = engine.open(std::path::Path::new("."))?;
//! let snapshot = state.update_root()?;
//! println!("{}", snapshot.status);
//! # Ok(())
//! # }
//! ```

/// Repository backends (git, hg, bzr, svn).
pub mod backend;

/// Command-line interface definitions (argument parsing structures).
pub mod cli;

/// Commands module containing all CLI command implementations.
pub mod commands;

/// Configuration parsing, validation, and management.
pub mod config;

/// Association of entries with repositories, refresh and invalidation.
pub mod engine;

/// Error types of the status engine.
pub mod error;

/// Output formatting for the CLI.
pub mod output;

/// Subprocess execution.
pub mod process;

/// Arena of directory entries.
pub mod registry;

/// Repository roots, root state and per-entry handles.
pub mod repo;

/// Background refresh worker.
pub mod scheduler;

/// Status codes and aggregation.
pub mod status;

/// The viewport the refresh worker reads.
pub mod ui;

#[cfg(test)]
pub mod test_utils;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Current version of the vcstat binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file path relative to the configuration directory.
pub const DEFAULT_CONFIG_PATH: &str = "vcstat/config.toml";

/// Environment variable overriding the configuration path.
pub const CONFIG_PATH_ENV: &str = "VCSTAT_CONFIG_PATH";

/// Central context for CLI operations: where the configuration lives and
/// what it says.
///
/// # Examples
///
/// ```no_run
/// use vcstat::VcsContext;
///
/// # fn main() -> anyhow::Result<()> {
/// // Context with the default configuration path
/// let ctx = VcsContext::new()?;
///
/// // Context with an explicit configuration file (for testing)
/// let ctx = VcsContext::new_explicit("/tmp/vcstat.toml".into())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct VcsContext {
    /// Path to the configuration file.
    pub config_path: PathBuf,

    /// Loaded configuration settings.
    pub config: config::Config,
}

impl VcsContext {
    /// Creates a new `VcsContext` by loading the configuration from
    /// `$VCSTAT_CONFIG_PATH` or the default path.
    ///
    /// # Errors
    /// Returns an error if the configuration directory cannot be determined or
    /// if the configuration file cannot be read or created.
    pub fn new() -> Result<Self> {
        let config_path = if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            PathBuf::from(path)
        } else {
            dirs::config_dir()
                .context("Could not find configuration directory")?
                .join(DEFAULT_CONFIG_PATH)
        };

        let context = Self::new_explicit(config_path)?;

        // Validate configuration and warn about issues
        let validator = config::validator::ConfigValidator::new();
        if let Err(e) = validator.validate_config_file(&context.config_path) {
            output::warning(&format!("Configuration validation failed: {e}"));
        }

        Ok(context)
    }

    /// Creates a new `VcsContext` for an explicit configuration file.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be loaded or created.
    pub fn new_explicit(config_path: PathBuf) -> Result<Self> {
        let config = config::Config::load(&config_path).with_context(|| {
            format!("Failed to load configuration: {}", config_path.display())
        })?;
        Ok(Self {
            config_path,
            config,
        })
    }

    /// Engine over a fresh registry, spawning the real tools.
    #[must_use]
    pub fn engine(&self) -> Arc<engine::Engine> {
        Arc::new(engine::Engine::with_system_runner(
            self.config.vcs.clone(),
            Arc::new(registry::Registry::new()),
        ))
    }
}
