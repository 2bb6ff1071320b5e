//! TOML parsing with backend-state validation.

use super::{Config, VcsConfig};
use anyhow::{Context, Result};
use std::path::Path;

/// Shortest accepted refresh interval
pub const MIN_IDLE_DELAY_MS: u64 = 100;
/// Shortest accepted subprocess timeout (0 disables the timeout)
pub const MIN_COMMAND_TIMEOUT_MS: u64 = 100;

/// Read and parse `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or [`parse_config_str`] fails.
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}

/// Parse TOML content and validate the `[vcs]` table.
///
/// # Errors
///
/// Returns an error for invalid TOML or out-of-range values.
pub fn parse_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse TOML config")?;

    // Validate and return validation errors directly without wrapping
    validate_vcs(&config.vcs)?;
    Ok(config)
}

/// Reject intervals below the accepted minimums.
///
/// # Errors
///
/// Returns an error naming the offending key.
pub fn validate_vcs(vcs: &VcsConfig) -> Result<()> {
    if vcs.idle_delay_ms < MIN_IDLE_DELAY_MS {
        anyhow::bail!("idle_delay_ms must be at least {MIN_IDLE_DELAY_MS}");
    }

    if vcs.command_timeout_ms != 0 && vcs.command_timeout_ms < MIN_COMMAND_TIMEOUT_MS {
        anyhow::bail!("command_timeout_ms must be 0 (disabled) or at least {MIN_COMMAND_TIMEOUT_MS}");
    }

    Ok(())
}
