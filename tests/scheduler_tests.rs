mod common;

use anyhow::Result;
use common::{RecordingViewport, ScriptedRunner, TestTree, engine, engine_with, load};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use vcstat::config::VcsConfig;
use vcstat::engine::Engine;
use vcstat::registry::Registry;
use vcstat::scheduler::{RefreshScheduler, SchedulerState, run_pass};
use vcstat::status::Status;
use vcstat::ui::{Column, Viewport};

#[test]
fn test_two_columns_refresh_root_once() -> Result<()> {
    let tree = TestTree::new()?;
    let repo = tree.repo("repo", ".git")?;
    let src = tree.dir("repo/src")?;
    tree.file("repo/src/main.rs", "fn main() {}")?;

    let runner = Arc::new(ScriptedRunner::default());
    runner.respond("status --porcelain", " M src/main.rs\n");
    let engine = engine(&runner);
    load(&engine, &repo)?;
    load(&engine, &src)?;

    let viewport = RecordingViewport::with_columns(&[&repo, &src]);
    let report = run_pass(&engine, &viewport);

    assert_eq!(report.refreshed, vec![repo.clone()]);
    assert_eq!(runner.count("status --porcelain"), 1);
    assert!(report.redraw);
    assert_eq!(viewport.redraws(), 1);
    assert_eq!(*viewport.marked.lock().unwrap(), vec![0, 1]);

    let main_id = engine.registry().lookup(&src.join("main.rs")).expect("entry");
    let main = engine.registry().entry(main_id).expect("entry");
    assert_eq!(main.vcs_status, Some(Status::Changed));
    Ok(())
}

#[test]
fn test_marker_directory_column_blocks_refresh() -> Result<()> {
    let tree = TestTree::new()?;
    let repo = tree.repo("repo", ".git")?;
    let marker = repo.join(".git");

    let runner = Arc::new(ScriptedRunner::default());
    let engine = engine(&runner);
    load(&engine, &repo)?;
    load(&engine, &marker)?;

    let viewport = RecordingViewport::with_columns(&[&marker]);
    let report = run_pass(&engine, &viewport);
    assert!(report.refreshed.is_empty());
    assert!(runner.calls().is_empty());

    let viewport = RecordingViewport::with_columns(&[&repo, &marker]);
    let report = run_pass(&engine, &viewport);
    assert!(report.refreshed.is_empty());
    assert!(runner.calls().is_empty());
    Ok(())
}

#[test]
fn test_flattened_column_suppresses_pass() -> Result<()> {
    let tree = TestTree::new()?;
    let repo = tree.repo("repo", ".git")?;
    let runner = Arc::new(ScriptedRunner::default());
    let engine = engine(&runner);

    let viewport = RecordingViewport::default();
    viewport.columns.lock().unwrap().extend([
        Column::new(&repo),
        Column {
            target: Some(repo.clone()),
            flattened: true,
        },
    ]);
    let report = run_pass(&engine, &viewport);
    assert!(report.skipped);
    assert!(runner.calls().is_empty());
    Ok(())
}

#[test]
fn test_up_to_date_root_is_not_refreshed() -> Result<()> {
    let tree = TestTree::new()?;
    let repo = tree.repo("repo", ".git")?;
    let file = tree.file("repo/a.txt", "x")?;
    let old = filetime::FileTime::from_unix_time(1_000_000, 0);
    for path in [file.clone(), repo.join(".git"), repo.clone()] {
        filetime::set_file_mtime(&path, old)?;
    }

    let runner = Arc::new(ScriptedRunner::default());
    let engine = engine(&runner);
    load(&engine, &repo)?;
    let viewport = RecordingViewport::with_columns(&[&repo]);

    assert_eq!(run_pass(&engine, &viewport).refreshed.len(), 1);
    runner.clear_calls();
    assert!(run_pass(&engine, &viewport).refreshed.is_empty());
    assert_eq!(runner.count("status --porcelain"), 0);
    Ok(())
}

#[test]
fn test_outdated_check_can_be_disabled() -> Result<()> {
    let tree = TestTree::new()?;
    let repo = tree.repo("repo", ".git")?;
    let runner = Arc::new(ScriptedRunner::default());
    let config = VcsConfig {
        check_outdated: false,
        ..VcsConfig::default()
    };
    let engine = engine_with(&runner, config);
    load(&engine, &repo)?;
    let viewport = RecordingViewport::with_columns(&[&repo]);

    run_pass(&engine, &viewport);
    run_pass(&engine, &viewport);
    assert_eq!(runner.count("status --porcelain"), 2);
    Ok(())
}

#[test]
fn test_child_root_gets_initialized() -> Result<()> {
    let tree = TestTree::new()?;
    let projects = tree.dir("projects")?;
    let repo = tree.repo("projects/app", ".git")?;
    tree.dir("projects/notes")?;

    let runner = Arc::new(ScriptedRunner::default());
    runner.respond("status --porcelain", "?? draft.md\n");
    let engine = engine(&runner);
    let projects_id = load(&engine, &projects)?;

    let viewport = RecordingViewport::with_columns(&[&projects]);
    let report = run_pass(&engine, &viewport);
    assert!(report.refreshed.is_empty());
    assert_eq!(report.initialized, vec![repo.clone()]);

    let projects_entry = engine.registry().entry(projects_id).expect("entry");
    assert!(projects_entry.has_vcs_child);
    let repo_id = engine.registry().lookup(&repo).expect("entry");
    let repo_entry = engine.registry().entry(repo_id).expect("entry");
    assert_eq!(repo_entry.vcs_status, Some(Status::Untracked));

    // Initialized roots are not initialized again
    runner.clear_calls();
    assert!(run_pass(&engine, &viewport).initialized.is_empty());
    assert_eq!(runner.count("status --porcelain"), 0);
    Ok(())
}

#[test]
fn test_failed_child_init_purges_root() -> Result<()> {
    let tree = TestTree::new()?;
    let projects = tree.dir("projects")?;
    let repo = tree.repo("projects/app", ".git")?;

    let runner = Arc::new(ScriptedRunner::default());
    runner.fail("status --porcelain", "fatal: not a git repository");
    let engine = engine(&runner);
    load(&engine, &projects)?;

    let viewport = RecordingViewport::with_columns(&[&projects]);
    let report = run_pass(&engine, &viewport);
    assert!(report.initialized.is_empty());
    assert!(report.redraw);

    let repo_id = engine.registry().lookup(&repo).expect("entry");
    assert_eq!(engine.registry().entry(repo_id).expect("entry").vcs_status, None);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_linked_child_root_mirrors_status() -> Result<()> {
    use std::os::unix::fs::symlink;

    let tree = TestTree::new()?;
    let repo = tree.repo("repo", ".git")?;
    let shelf = tree.dir("shelf")?;
    symlink(&repo, shelf.join("alias"))?;

    let runner = Arc::new(ScriptedRunner::default());
    runner.respond("status --porcelain", "UU merge.txt\n");
    let engine = engine(&runner);
    load(&engine, &shelf)?;

    let viewport = RecordingViewport::with_columns(&[&shelf]);
    run_pass(&engine, &viewport);

    let alias_id = engine.registry().lookup(&shelf.join("alias")).expect("entry");
    let alias = engine.registry().entry(alias_id).expect("entry");
    assert_eq!(alias.vcs_status, Some(Status::Conflict));
    Ok(())
}

#[test]
fn test_worker_refreshes_on_wakeup() -> Result<()> {
    let tree = TestTree::new()?;
    let repo = tree.repo("repo", ".git")?;

    let runner = Arc::new(ScriptedRunner::default());
    let engine = Arc::new(engine(&runner));
    load(&engine, &repo)?;
    let viewport = Arc::new(RecordingViewport::with_columns(&[&repo]));

    let scheduler = RefreshScheduler::spawn(
        Arc::clone(&engine),
        Arc::clone(&viewport) as Arc<dyn Viewport>,
        Duration::from_secs(3600),
    )?;
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    scheduler.wakeup();

    let deadline = Instant::now() + Duration::from_secs(5);
    while viewport.redraws() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(viewport.redraws(), 1);
    assert_eq!(runner.count("status --porcelain"), 1);

    scheduler.shutdown();
    Ok(())
}

fn git(repo: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(repo)
        .status()?;
    anyhow::ensure!(status.success(), "git {args:?} failed");
    Ok(())
}

#[test]
fn test_external_add_triggers_refresh() -> Result<()> {
    if which::which("git").is_err() {
        return Ok(());
    }
    let tree = TestTree::new()?;
    let repo = tree.dir("repo")?;
    git(&repo, &["init", "-q"])?;
    let file = tree.file("repo/a.txt", "one\n")?;
    git(&repo, &["add", "a.txt"])?;
    git(&repo, &["commit", "-q", "-m", "first"])?;
    fs::write(&file, "two\n")?;

    let engine = Engine::with_system_runner(VcsConfig::default(), Arc::new(Registry::new()));
    load(&engine, &repo)?;
    let viewport = RecordingViewport::with_columns(&[&repo]);
    let file_status = |engine: &Engine| {
        engine
            .registry()
            .lookup(&file)
            .and_then(|id| engine.registry().entry(id))
            .and_then(|entry| entry.vcs_status)
    };

    assert_eq!(run_pass(&engine, &viewport).refreshed, vec![repo.clone()]);
    assert_eq!(file_status(&engine), Some(Status::Changed));

    // Leave a gap so the index mtime lands after the recorded refresh time
    thread::sleep(Duration::from_millis(50));
    git(&repo, &["add", "a.txt"])?;

    assert_eq!(run_pass(&engine, &viewport).refreshed, vec![repo.clone()]);
    assert_eq!(file_status(&engine), Some(Status::Staged));
    Ok(())
}
