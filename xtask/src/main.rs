//! Packaging tasks for vcstat: man pages, shell completions and the
//! default configuration file, all generated from the library's own
//! definitions so they cannot drift from the binary.

use anyhow::{Context, Result};
use clap::{Command, CommandFactory, Parser};
use clap_complete::Shell;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use vcstat::config::Config;

#[derive(Parser)]
#[command(name = "xtask", about = "Packaging tasks for vcstat")]
enum Task {
    /// Render vcstat(1) and one page per subcommand
    Man {
        /// Output directory
        #[arg(short, long, default_value = "target/dist/man")]
        output: PathBuf,
    },

    /// Write completion scripts for every supported shell
    Completions {
        /// Output directory
        #[arg(short, long, default_value = "target/dist/completions")]
        output: PathBuf,
    },

    /// Write the configuration a fresh install starts with
    DefaultConfig {
        /// Destination file
        #[arg(short, long, default_value = "target/dist/config.toml")]
        output: PathBuf,
    },

    /// Run every task into one directory
    Dist {
        /// Output directory
        #[arg(short, long, default_value = "target/dist")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    match Task::parse() {
        Task::Man { output } => report(&man_pages(&output)?),
        Task::Completions { output } => report(&completions(&output)?),
        Task::DefaultConfig { output } => report(&[default_config(&output)?]),
        Task::Dist { output } => {
            let mut written = man_pages(&output.join("man"))?;
            written.extend(completions(&output.join("completions"))?);
            written.push(default_config(&output.join("config.toml"))?);
            report(&written);
        }
    }
    Ok(())
}

fn report(written: &[PathBuf]) {
    for path in written {
        println!("✓ Generated: {}", path.display());
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// `vcstat.1` plus `vcstat-<name>.1` for each visible subcommand.
fn man_pages(output_dir: &Path) -> Result<Vec<PathBuf>> {
    create_dir(output_dir)?;
    let cmd = vcstat::cli::Cli::command();

    let mut written = vec![render_man(&cmd, &output_dir.join("vcstat.1"))?];
    for sub in cmd.get_subcommands().filter(|sub| !sub.is_hide_set()) {
        // Subcommand pages are titled after the full invocation
        let page = sub.clone().name(format!("vcstat-{}", sub.get_name()));
        let path = output_dir.join(format!("vcstat-{}.1", sub.get_name()));
        written.push(render_man(&page, &path)?);
    }
    Ok(written)
}

fn render_man(cmd: &Command, path: &Path) -> Result<PathBuf> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create man page: {}", path.display()))?;
    clap_mangen::Man::new(cmd.clone()).render(&mut BufWriter::new(file))?;
    Ok(path.to_path_buf())
}

fn completions(output_dir: &Path) -> Result<Vec<PathBuf>> {
    create_dir(output_dir)?;
    let mut cmd = vcstat::cli::Cli::command();
    [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::Elvish, Shell::PowerShell]
        .into_iter()
        .map(|shell| {
            clap_complete::generate_to(shell, &mut cmd, "vcstat", output_dir)
                .with_context(|| format!("Failed to write {shell} completions"))
        })
        .collect()
}

fn default_config(path: &Path) -> Result<PathBuf> {
    Config::default().save(path)?;
    Ok(path.to_path_buf())
}
