//! Background refresh of the repositories behind the visible columns.
//!
//! ```text
//!   Idle ──delay or wakeup──► Scanning ──► Sleeping ──delay or wakeup──► Scanning ...
//! ```
//!
//! A single worker thread runs every passive subprocess. [`run_pass`] is the
//! body of one scan and is usable on its own, which is what the tests do.

use std::collections::HashSet;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{Level, debug, error, span, warn};

use crate::engine::{CheckOutcome, Engine};
use crate::registry::EntryId;
use crate::ui::Viewport;

/// Observable phase of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the first pass.
    Idle,
    Scanning,
    /// Waiting between passes.
    Sleeping,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// A flattened column suppressed the pass.
    pub skipped: bool,
    /// Roots whose full status was fetched.
    pub refreshed: Vec<PathBuf>,
    /// Nested roots that got their first, cheap initialization.
    pub initialized: Vec<PathBuf>,
    /// The columns were marked and a redraw requested.
    pub redraw: bool,
}

/// Run one refresh pass over the viewport.
pub fn run_pass(engine: &Engine, viewport: &dyn Viewport) -> PassReport {
    let span = span!(Level::DEBUG, "refresh_pass");
    let _guard = span.enter();

    let columns = viewport.visible_columns();
    if columns.iter().any(|column| column.flattened) {
        debug!("Flattened column visible, skipping pass");
        return PassReport {
            skipped: true,
            ..PassReport::default()
        };
    }

    let registry = engine.registry();
    let mut directories: Vec<(usize, EntryId)> = Vec::new();
    let mut blocked: HashSet<EntryId> = HashSet::new();
    for (index, column) in columns.iter().enumerate() {
        let Some(target) = column.target.as_deref() else {
            continue;
        };
        let id = registry.get_or_insert(target);
        let Some(entry) = registry.entry(id) else {
            continue;
        };
        let owner = if entry.is_directory {
            directories.push((index, id));
            engine.handle(id)
        } else {
            target
                .parent()
                .and_then(|parent| engine.handle(registry.get_or_insert(parent)))
        };
        if let Some(handle) = owner.filter(|handle| handle.in_repodir) {
            blocked.extend(handle.root_id);
        }
    }
    let targets: HashSet<EntryId> = directories.iter().map(|&(_, id)| id).collect();

    let mut report = PassReport::default();
    let mut visited: HashSet<EntryId> = HashSet::new();
    for &(_, dir_id) in &directories {
        if engine.check(dir_id) == CheckOutcome::Reinitialized {
            report.redraw = true;
        }
        let Some(handle) = engine.handle(dir_id) else {
            continue;
        };

        if handle.track {
            if let (Some(root_id), Some(state)) = (handle.root_id, handle.state.as_ref()) {
                if !visited.contains(&root_id)
                    && !blocked.contains(&root_id)
                    && engine.is_outdated(state)
                {
                    visited.insert(root_id);
                    engine.refresh(root_id);
                    report.refreshed.push(state.root().to_path_buf());
                    report.redraw = true;
                }
            }
        }

        let mut has_vcs_child = false;
        for child_id in registry.children(dir_id) {
            let Some(child) = registry.entry(child_id) else {
                continue;
            };
            if !child.is_directory {
                continue;
            }
            let Some(child_handle) = engine.handle(child_id) else {
                continue;
            };
            if !child_handle.is_root_pointer() {
                continue;
            }
            has_vcs_child = true;
            let (Some(root_id), Some(state)) = (child_handle.root_id, child_handle.state.as_ref())
            else {
                continue;
            };

            if !state.is_initialized()
                && !targets.contains(&child_id)
                && !blocked.contains(&root_id)
                && visited.insert(root_id)
            {
                match engine.init_root(root_id) {
                    Ok(()) => report.initialized.push(state.root().to_path_buf()),
                    Err(e) => {
                        warn!(root = %state.root().display(), error = %e, "Root initialization failed");
                        engine.update_tree(root_id, true);
                    }
                }
                report.redraw = true;
            }

            if child_handle.is_root_link {
                if let Some(root_entry) = registry.entry(root_id) {
                    registry.update(child_id, |entry| {
                        entry.vcs_status = root_entry.vcs_status;
                        entry.vcs_remote_status = root_entry.vcs_remote_status;
                    });
                }
            }
        }
        registry.update(dir_id, |entry| entry.has_vcs_child = has_vcs_child);
    }

    if report.redraw {
        for &(index, _) in &directories {
            viewport.mark_column_redraw(index);
        }
        viewport.request_redraw();
    }
    report
}

struct Control {
    woken: bool,
    paused: bool,
    shutdown: bool,
    state: SchedulerState,
}

struct Shared {
    control: Mutex<Control>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify<F: FnOnce(&mut Control)>(&self, change: F) {
        change(&mut self.lock());
        self.signal.notify_all();
    }

    /// Wait in `phase` for the delay or a wakeup. Returns `false` on
    /// shutdown.
    fn wait(&self, phase: SchedulerState, delay: Duration) -> bool {
        let mut control = self.lock();
        control.state = phase;
        let deadline = Instant::now() + delay;
        loop {
            if control.shutdown {
                return false;
            }
            if !control.paused {
                if control.woken {
                    break;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                control = self
                    .signal
                    .wait_timeout(control, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            } else {
                control = self
                    .signal
                    .wait(control)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        control.woken = false;
        control.state = SchedulerState::Scanning;
        true
    }
}

/// Wakes the worker from any thread.
#[derive(Clone)]
pub struct Waker {
    shared: Arc<Shared>,
}

impl Waker {
    /// Interrupt the current wait. Never interrupts a running subprocess.
    /// Start a pass now instead of after the idle delay.
    pub fn wakeup(&self) {
        self.shared.notify(|control| control.woken = true);
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker").finish_non_exhaustive()
    }
}

/// Handle to the background refresh worker. Dropping it stops the worker.
pub struct RefreshScheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Start the worker thread.
    ///
    /// # Errors
    ///
    /// Returns the error of `thread::Builder::spawn`.
    pub fn spawn(
        engine: Arc<Engine>,
        viewport: Arc<dyn Viewport>,
        idle_delay: Duration,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                woken: false,
                paused: false,
                shutdown: false,
                state: SchedulerState::Idle,
            }),
            signal: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("vcs-refresh".to_string())
            .spawn(move || work(&worker_shared, &engine, viewport.as_ref(), idle_delay))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    pub fn wakeup(&self) {
        self.waker().wakeup();
    }

    /// Cloneable handle for waking the worker from other threads.
    #[must_use]
    pub fn waker(&self) -> Waker {
        Waker {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Suspend passes after the current one.
    pub fn pause(&self) {
        self.shared.notify(|control| control.paused = true);
    }

    /// Undo [`Self::pause`].
    pub fn resume(&self) {
        self.shared.notify(|control| control.paused = false);
    }

    /// What the worker is doing right now.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.shared.lock().state
    }

    /// Stop the worker and wait for it to finish its current pass.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shared.notify(|control| control.shutdown = true);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Refresh worker terminated abnormally");
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn work(shared: &Shared, engine: &Engine, viewport: &dyn Viewport, idle_delay: Duration) {
    let mut phase = SchedulerState::Idle;
    while shared.wait(phase, idle_delay) {
        match panic::catch_unwind(AssertUnwindSafe(|| run_pass(engine, viewport))) {
            Ok(report) => debug!(
                refreshed = report.refreshed.len(),
                initialized = report.initialized.len(),
                skipped = report.skipped,
                "Refresh pass done"
            ),
            Err(_) => error!("Refresh pass panicked"),
        }
        phase = SchedulerState::Sleeping;
    }
    shared.lock().state = SchedulerState::Idle;
    debug!("Refresh worker stopped");
}
