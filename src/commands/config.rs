//! `vcstat config`: show, read or change settings.

use crate::VcsContext;
use crate::config::Config;
use crate::output;
use anyhow::Result;
use colored::Colorize;

/// Execute config command to get/set configuration values
///
/// # Errors
///
/// Returns an error if:
/// - The key is unknown
/// - The value fails validation
/// - Failed to save configuration
pub fn execute(
    ctx: &mut VcsContext,
    key: Option<&str>,
    value: Option<&str>,
    list: bool,
) -> Result<()> {
    // If --list flag is set or no key is provided, show all configuration
    let Some(key) = key.filter(|_| !list) else {
        show_all_config(ctx);
        return Ok(());
    };

    if let Some(value) = value {
        ctx.config.set(key, value)?;
        ctx.config.save(&ctx.config_path)?;
        output::success(&format!("Set {key} = {value}"));
    } else if let Some(value) = ctx.config.get(key) {
        println!("{value}");
    } else {
        return Err(anyhow::anyhow!("Unknown configuration key: {key}"));
    }

    Ok(())
}

/// Show all configuration values
fn show_all_config(ctx: &VcsContext) {
    println!("{}", "[vcs]".bold());
    for key in Config::KEYS {
        if let Some(value) = ctx.config.get(key) {
            let name = key.strip_prefix("vcs.").unwrap_or(key);
            println!("  {name} = {value}");
        }
    }
}
