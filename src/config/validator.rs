//! Lints for a loaded configuration, reported as warnings.

use anyhow::Result;
use colored::Colorize;
use std::collections::HashSet;
use std::path::Path;

use super::Config;

/// Reports configuration fields vcstat does not recognize
pub struct ConfigValidator {
    /// Set of valid configuration fields
    known_fields: HashSet<String>,
}

impl ConfigValidator {
    /// Create a new validator with known configuration fields
    #[must_use]
    pub fn new() -> Self {
        let mut known_fields: HashSet<String> =
            Config::KEYS.iter().map(|key| (*key).to_string()).collect();
        known_fields.insert("vcs".to_string());

        Self { known_fields }
    }

    /// Unknown fields in `content`, as dotted keys
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML
    pub fn unknown_fields(&self, content: &str) -> Result<Vec<String>> {
        let parsed: toml::Value = toml::from_str(content)?;
        let mut unknown = Vec::new();
        self.check_table(&parsed, "", &mut unknown);
        Ok(unknown)
    }

    /// Validate a configuration file and warn about unknown fields
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub fn validate_config_file(&self, config_path: &Path) -> Result<()> {
        if !config_path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(config_path)?;
        let unknown = self.unknown_fields(&content)?;

        if !unknown.is_empty() {
            eprintln!("{}", "Configuration warnings:".yellow().bold());
            for field in unknown {
                eprintln!("  Unknown configuration field: {}", field.yellow());
            }
            eprintln!();
        }

        Ok(())
    }

    /// Recursively checks a TOML table for unknown fields
    fn check_table(&self, table: &toml::Value, prefix: &str, unknown: &mut Vec<String>) {
        let toml::Value::Table(map) = table else {
            return;
        };

        for (key, value) in map {
            let full_key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };

            if !self.known_fields.contains(&full_key) {
                unknown.push(full_key);
            } else if let toml::Value::Table(_) = value {
                self.check_table(value, &full_key, unknown);
            }
        }
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_fields_pass() -> Result<()> {
        let validator = ConfigValidator::new();
        let unknown = validator.unknown_fields("[vcs]\nbackend_git = \"enabled\"\nshow_ignored = false\n")?;
        assert!(unknown.is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_fields_reported() -> Result<()> {
        let validator = ConfigValidator::new();
        let unknown =
            validator.unknown_fields("[vcs]\nbackend_cvs = \"enabled\"\n[core]\npager = \"less\"\n")?;
        assert_eq!(unknown, vec!["core".to_string(), "vcs.backend_cvs".to_string()]);
        Ok(())
    }
}
