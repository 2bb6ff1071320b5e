//! Settings loaded from `~/.config/vcstat/config.toml`.

/// Reading and checking config files.
pub mod parser;
/// Non-fatal configuration lints.
pub mod validator;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::BackendKind;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// The `[vcs]` table.
    #[serde(default)]
    pub vcs: VcsConfig,
}

/// How a backend participates in status tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enablement {
    /// Fully enabled, including the remote status query.
    Enabled,
    /// Enabled without the remote status query.
    #[serde(alias = "local-only")]
    Local,
    /// Markers of this backend are ignored.
    Disabled,
}

impl Enablement {
    /// Markers of the backend are honoured.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Enabled | Self::Local)
    }

    /// Name used in the config file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Local => "local",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for Enablement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Enablement {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "enabled" => Ok(Self::Enabled),
            "local" | "local-only" => Ok(Self::Local),
            "disabled" => Ok(Self::Disabled),
            other => Err(anyhow::anyhow!(
                "Invalid backend setting: {other} (expected enabled, local or disabled)"
            )),
        }
    }
}

/// Status tracking settings.
///
/// Only git is enabled by default; the other tools are slow enough on large
/// trees that they are opt-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VcsConfig {
    /// git
    #[serde(default = "default_git")]
    pub backend_git: Enablement,
    /// Mercurial
    #[serde(default = "default_disabled")]
    pub backend_hg: Enablement,
    /// Bazaar
    #[serde(default = "default_disabled")]
    pub backend_bzr: Enablement,
    /// Subversion
    #[serde(default = "default_disabled")]
    pub backend_svn: Enablement,
    /// Sleep between unforced refresh passes
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    /// Subprocess timeout, 0 disables it
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Skip refreshing roots whose files are older than the last refresh
    #[serde(default = "default_true")]
    pub check_outdated: bool,
    /// Report ignored paths instead of leaving them unmarked
    #[serde(default = "default_true")]
    pub show_ignored: bool,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            backend_git: default_git(),
            backend_hg: default_disabled(),
            backend_bzr: default_disabled(),
            backend_svn: default_disabled(),
            idle_delay_ms: default_idle_delay_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            check_outdated: true,
            show_ignored: true,
        }
    }
}

impl VcsConfig {
    /// Setting for `kind`
    #[must_use]
    pub const fn enablement(&self, kind: BackendKind) -> Enablement {
        match kind {
            BackendKind::Git => self.backend_git,
            BackendKind::Hg => self.backend_hg,
            BackendKind::Bzr => self.backend_bzr,
            BackendKind::Svn => self.backend_svn,
        }
    }

    /// Change the setting for `kind`
    pub fn set_enablement(&mut self, kind: BackendKind, value: Enablement) {
        match kind {
            BackendKind::Git => self.backend_git = value,
            BackendKind::Hg => self.backend_hg = value,
            BackendKind::Bzr => self.backend_bzr = value,
            BackendKind::Svn => self.backend_svn = value,
        }
    }

    /// Backends whose markers are honoured, in lookup order
    #[must_use]
    pub fn enabled_backends(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.enablement(*kind).is_active())
            .collect()
    }

    /// Sleep between unforced refresh passes
    #[must_use]
    pub const fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    /// Subprocess timeout, `None` when disabled
    #[must_use]
    pub const fn command_timeout(&self) -> Option<Duration> {
        if self.command_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.command_timeout_ms))
        }
    }
}

impl Config {
    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot read or parse the configuration file
    /// - Configuration file contains invalid TOML or out-of-range values
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            // Create default config if it doesn't exist
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        parser::parse_config_file(path)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Cannot create parent directories
    /// - Cannot write to the file
    /// - TOML serialization fails
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create config file: {}", path.display()))?;
        file.write_all(toml_str.as_bytes())?;
        Ok(())
    }

    /// All keys understood by [`Config::get`] and [`Config::set`]
    pub const KEYS: [&'static str; 8] = [
        "vcs.backend_git",
        "vcs.backend_hg",
        "vcs.backend_bzr",
        "vcs.backend_svn",
        "vcs.idle_delay_ms",
        "vcs.command_timeout_ms",
        "vcs.check_outdated",
        "vcs.show_ignored",
    ];

    /// Get a configuration value by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let (section, name) = key.split_once('.')?;
        if section != "vcs" {
            return None;
        }

        if let Some(kind) = name.strip_prefix("backend_") {
            let kind: BackendKind = kind.parse().ok()?;
            return Some(self.vcs.enablement(kind).to_string());
        }

        match name {
            "idle_delay_ms" => Some(self.vcs.idle_delay_ms.to_string()),
            "command_timeout_ms" => Some(self.vcs.command_timeout_ms.to_string()),
            "check_outdated" => Some(self.vcs.check_outdated.to_string()),
            "show_ignored" => Some(self.vcs.show_ignored.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key format is invalid (must be section.key)
    /// - The key is unknown
    /// - The value does not parse or fails validation
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let Some((section, name)) = key.split_once('.') else {
            return Err(anyhow::anyhow!("Invalid configuration key: {key}"));
        };
        if section != "vcs" {
            return Err(anyhow::anyhow!("Unknown configuration key: {key}"));
        }

        let mut updated = self.vcs.clone();
        if let Some(kind) = name.strip_prefix("backend_") {
            let kind: BackendKind = kind
                .parse()
                .map_err(|_| anyhow::anyhow!("Unknown configuration key: {key}"))?;
            updated.set_enablement(kind, value.parse()?);
        } else {
            match name {
                "idle_delay_ms" => {
                    updated.idle_delay_ms = value
                        .parse()
                        .with_context(|| format!("Invalid number: {value}"))?;
                }
                "command_timeout_ms" => {
                    updated.command_timeout_ms = value
                        .parse()
                        .with_context(|| format!("Invalid number: {value}"))?;
                }
                "check_outdated" => {
                    updated.check_outdated = value
                        .parse()
                        .with_context(|| format!("Invalid boolean: {value}"))?;
                }
                "show_ignored" => {
                    updated.show_ignored = value
                        .parse()
                        .with_context(|| format!("Invalid boolean: {value}"))?;
                }
                _ => return Err(anyhow::anyhow!("Unknown configuration key: {key}")),
            }
        }

        parser::validate_vcs(&updated)?;
        self.vcs = updated;
        Ok(())
    }
}

// Default functions for serde
const fn default_git() -> Enablement {
    Enablement::Enabled
}

const fn default_disabled() -> Enablement {
    Enablement::Disabled
}

const fn default_idle_delay_ms() -> u64 {
    2000
}

const fn default_command_timeout_ms() -> u64 {
    30_000
}

const fn default_true() -> bool {
    true
}
