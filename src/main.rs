//! `vcstat` binary entry point.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use colored::Colorize;
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;
use vcstat::cli::{Cli, Commands};
use vcstat::error::VcsError;
use vcstat::output::{self, Verbosity};
use vcstat::{VcsContext, commands};

fn main() {
    if let Err(e) = run() {
        let message = match e.downcast_ref::<VcsError>() {
            Some(vcs_error) => vcs_error.user_message(),
            None => format!("{e:#}"),
        };
        eprintln!("{} {}", "Error:".red().bold(), message);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("VCSTAT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if cli.quiet {
        output::set_verbosity(Verbosity::Quiet);
    } else if cli.verbose {
        output::set_verbosity(Verbosity::Verbose);
    }

    if let Commands::Completion { shell } = cli.command {
        print_completions(shell, &mut Cli::command());
        return Ok(());
    }

    let mut ctx = VcsContext::new()?;
    let dir = cli.directory.as_deref();

    match cli.command {
        Commands::Status { short } => commands::status::execute(&ctx, dir, short)?,
        Commands::Log { limit, raw, files } => {
            commands::log::execute(&ctx, dir, limit, raw, &files)?;
        }
        Commands::Info { revision, id } => commands::info::info(&ctx, dir, &revision, id)?,
        Commands::Files { revision } => commands::info::files(&ctx, dir, &revision)?,
        Commands::Diff { revision, files } => {
            commands::diff::execute(&ctx, dir, revision.as_deref(), &files)?;
        }
        Commands::Remote => commands::info::remote(&ctx, dir)?,
        Commands::Add { files } => commands::actions::add(&ctx, dir, &files)?,
        Commands::Reset { files } => commands::actions::reset(&ctx, dir, &files)?,
        Commands::Commit { message } => commands::actions::commit(&ctx, dir, &message)?,
        Commands::Pull { source } => commands::actions::pull(&ctx, dir, source.as_deref())?,
        Commands::Push { target } => commands::actions::push(&ctx, dir, target.as_deref())?,
        Commands::Checkout { revision } => commands::actions::checkout(&ctx, dir, &revision)?,
        Commands::Extract {
            revision,
            name,
            dest,
        } => commands::actions::extract(&ctx, dir, &revision, &name, &dest)?,
        Commands::Watch { dirs, interval } => {
            commands::watch::execute(&ctx, dir, &dirs, interval)?;
        }
        Commands::Config { key, value, list } => {
            commands::config::execute(&mut ctx, key.as_deref(), value.as_deref(), list)?;
        }
        Commands::Completion { .. } => {}
    }

    Ok(())
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
