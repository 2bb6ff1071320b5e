#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use vcstat::config::VcsConfig;
use vcstat::engine::Engine;
use vcstat::error::VcsError;
use vcstat::process::{Invocation, ProcessRunner};
use vcstat::registry::{EntryId, Registry};
use vcstat::ui::{Column, Viewport};

enum Reply {
    Output(Vec<u8>),
    Failure(String),
}

/// Process runner answering from a script instead of spawning tools.
///
/// The most recently added rule whose pattern occurs in the command line
/// wins; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, Reply)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn respond(&self, pattern: &str, output: &str) {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Reply::Output(output.as_bytes().to_vec())));
    }

    pub fn fail(&self, pattern: &str, stderr: &str) {
        self.rules
            .lock()
            .unwrap()
            .push((pattern.to_string(), Reply::Failure(stderr.to_string())));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|line| line.contains(pattern)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> vcstat::error::Result<Vec<u8>> {
        let line = invocation.command_line();
        self.calls.lock().unwrap().push(line.clone());
        let rules = self.rules.lock().unwrap();
        match rules.iter().rev().find(|(pattern, _)| line.contains(pattern.as_str())) {
            Some((_, Reply::Output(output))) => Ok(output.clone()),
            Some((_, Reply::Failure(stderr))) => Err(VcsError::ExternalTool {
                command: line,
                cwd: invocation.cwd.clone(),
                code: Some(1),
                detail: stderr.clone(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Directory tree fixture with canonical paths.
pub struct TestTree {
    pub temp_dir: TempDir,
    root: PathBuf,
}

impl TestTree {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let root = fs::canonicalize(temp_dir.path())?;
        Ok(Self { temp_dir, root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, rel: &str) -> Result<PathBuf> {
        let path = self.root.join(rel);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    pub fn file(&self, rel: &str, content: &str) -> Result<PathBuf> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Create `rel` with a `marker` directory (".git", ".hg", ...)
    pub fn repo(&self, rel: &str, marker: &str) -> Result<PathBuf> {
        let path = self.dir(rel)?;
        fs::create_dir_all(path.join(marker))?;
        Ok(path)
    }
}

/// Engine with every backend enabled over a scripted runner.
pub fn engine(runner: &Arc<ScriptedRunner>) -> Engine {
    engine_with(runner, VcsConfig::default())
}

pub fn engine_with(runner: &Arc<ScriptedRunner>, config: VcsConfig) -> Engine {
    Engine::new(
        config,
        Arc::clone(runner) as Arc<dyn ProcessRunner>,
        Arc::new(Registry::new()),
    )
}

/// Register `path` and load it as a directory.
pub fn load(engine: &Engine, path: &Path) -> Result<EntryId> {
    let id = engine.registry().get_or_insert(path);
    engine.registry().load_directory(id)?;
    Ok(id)
}

/// Viewport with fixed columns that counts redraw requests.
#[derive(Default)]
pub struct RecordingViewport {
    pub columns: Mutex<Vec<Column>>,
    pub marked: Mutex<Vec<usize>>,
    pub redraws: Mutex<usize>,
}

impl RecordingViewport {
    pub fn with_columns<P: AsRef<Path>>(paths: &[P]) -> Self {
        let viewport = Self::default();
        *viewport.columns.lock().unwrap() = paths
            .iter()
            .map(|path| Column::new(path.as_ref()))
            .collect();
        viewport
    }

    pub fn redraws(&self) -> usize {
        *self.redraws.lock().unwrap()
    }
}

impl Viewport for RecordingViewport {
    fn visible_columns(&self) -> Vec<Column> {
        self.columns.lock().unwrap().clone()
    }

    fn mark_column_redraw(&self, index: usize) {
        self.marked.lock().unwrap().push(index);
    }

    fn request_redraw(&self) {
        *self.redraws.lock().unwrap() += 1;
    }
}
