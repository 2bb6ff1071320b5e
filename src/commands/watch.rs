//! `vcstat watch`: run the background scheduler over a directory and print
//! each published refresh.

use crate::VcsContext;
use crate::engine::Engine;
use crate::output;
use crate::scheduler::RefreshScheduler;
use crate::ui::{Column, Viewport};
use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::BTreeSet;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

enum Event {
    Redraw,
    Wakeup,
    Quit,
}

/// Columns printed to stdout whenever the worker asks for a redraw.
struct TerminalViewport {
    columns: Vec<Column>,
    dirty: Mutex<BTreeSet<usize>>,
    events: Sender<Event>,
}

impl TerminalViewport {
    fn take_dirty(&self) -> BTreeSet<usize> {
        std::mem::take(&mut *self.dirty.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Viewport for TerminalViewport {
    fn visible_columns(&self) -> Vec<Column> {
        self.columns.clone()
    }

    fn mark_column_redraw(&self, index: usize) {
        self.dirty
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index);
    }

    fn request_redraw(&self) {
        // The receiver is gone only while shutting down.
        let _ = self.events.send(Event::Redraw);
    }
}

/// Execute watch command: refresh in the background and print the columns
/// after every pass that changed something. Enter forces a pass, `q` quits.
///
/// # Errors
///
/// Returns an error if a directory cannot be listed or the worker cannot be
/// started
pub fn execute(
    ctx: &VcsContext,
    dir: Option<&Path>,
    dirs: &[PathBuf],
    interval: Option<u64>,
) -> Result<()> {
    let base = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("Could not determine working directory")?,
    };
    let dirs: Vec<PathBuf> = if dirs.is_empty() {
        vec![base]
    } else {
        dirs.iter().map(|dir| base.join(dir)).collect()
    };

    let delay = interval.map_or_else(|| ctx.config.vcs.idle_delay(), Duration::from_millis);
    let engine = ctx.engine();
    let registry = engine.registry();
    for dir in &dirs {
        let id = registry.get_or_insert(dir);
        registry
            .load_directory(id)
            .with_context(|| format!("Failed to list directory: {}", dir.display()))?;
    }

    let (events, receiver) = mpsc::channel();
    let viewport = Arc::new(TerminalViewport {
        columns: dirs.iter().map(Column::new).collect(),
        dirty: Mutex::new(BTreeSet::new()),
        events: events.clone(),
    });
    let scheduler = RefreshScheduler::spawn(
        Arc::clone(&engine),
        Arc::clone(&viewport) as Arc<dyn Viewport>,
        delay,
    )
    .context("Failed to start refresh worker")?;

    thread::Builder::new()
        .name("watch-input".to_string())
        .spawn(move || read_input(&events))
        .context("Failed to start input reader")?;

    output::info(&format!(
        "Watching {} director{} every {}, Enter refreshes, q quits",
        dirs.len(),
        if dirs.len() == 1 { "y" } else { "ies" },
        humantime::format_duration(delay)
    ));
    scheduler.wakeup();

    for event in receiver {
        match event {
            Event::Redraw => render(&engine, &viewport),
            Event::Wakeup => scheduler.wakeup(),
            Event::Quit => break,
        }
    }

    scheduler.shutdown();
    Ok(())
}

fn read_input(events: &Sender<Event>) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let event = if line.trim() == "q" {
            Event::Quit
        } else {
            Event::Wakeup
        };
        let quit = matches!(event, Event::Quit);
        if events.send(event).is_err() || quit {
            return;
        }
    }
    let _ = events.send(Event::Quit);
}

fn render(engine: &Engine, viewport: &TerminalViewport) {
    let registry = engine.registry();
    for index in viewport.take_dirty() {
        let Some(target) = viewport.columns.get(index).and_then(|c| c.target.as_ref()) else {
            continue;
        };
        let id = registry.get_or_insert(target);
        if let Err(e) = registry.load_directory(id) {
            super::print_error(&format!("{}: {e}", target.display()));
            continue;
        }

        let header = match engine.handle(id).and_then(|handle| handle.state) {
            Some(state) => {
                let snapshot = state.snapshot();
                format!(
                    "{} [{} {}, remote {}]",
                    target.display().to_string().bold(),
                    state.kind(),
                    output::status_label(snapshot.status),
                    output::remote_label(snapshot.remote)
                )
            }
            None => target.display().to_string().bold().to_string(),
        };
        println!("\n{header}");

        for child_id in registry.children(id) {
            let Some(child) = registry.entry(child_id) else {
                continue;
            };
            let marker = child
                .vcs_status
                .map_or_else(|| " ".normal(), output::status_marker);
            let name = child.basename().to_string_lossy();
            if child.is_directory {
                let flag = if child.has_vcs_child { " +" } else { "" };
                println!("  {marker} {}/{flag}", name.blue());
            } else {
                println!("  {marker} {name}");
            }
        }
    }
}
