//! External command execution.
//!
//! Every backend talks to its tool through a [`ProcessRunner`]. The system
//! implementation spawns the command in its own process group so a timeout
//! can kill the tool together with any helpers it started (ssh, pagers,
//! credential helpers).

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use command_group::{CommandGroup, GroupChild};
use tracing::{Level, debug, span, warn};

use crate::error::{Result, VcsError};

/// What to do with the command's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Collect stdout and return it.
    Stdout,
    /// Send stdout to the null device.
    Discard,
}

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable name, looked up in `PATH`.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<OsString>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Stdout handling.
    pub capture: Capture,
    /// Exit codes treated as success.
    pub ok_codes: Vec<i32>,
}

impl Invocation {
    /// New invocation capturing stdout and accepting only exit code 0.
    pub fn new<I, S>(program: &str, args: I, cwd: &Path) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(|arg| arg.as_ref().to_owned()).collect(),
            cwd: cwd.to_path_buf(),
            capture: Capture::Stdout,
            ok_codes: vec![0],
        }
    }

    /// Discard stdout instead of capturing it.
    #[must_use]
    pub fn discard(mut self) -> Self {
        self.capture = Capture::Discard;
        self
    }

    /// Also accept `code` as a successful exit.
    #[must_use]
    pub fn allow_code(mut self, code: i32) -> Self {
        self.ok_codes.push(code);
        self
    }

    /// Human-readable command line for logs and errors.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Arguments as lossy strings, mostly for assertions.
    #[must_use]
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    fn failure(&self, code: Option<i32>, detail: impl Into<String>) -> VcsError {
        VcsError::ExternalTool {
            command: self.command_line(),
            cwd: self.cwd.clone(),
            code,
            detail: detail.into(),
        }
    }
}

/// Executes [`Invocation`]s. Implemented by [`SystemRunner`] and by scripted
/// runners in tests.
pub trait ProcessRunner: Send + Sync {
    /// Run the command to completion and return captured stdout (empty when
    /// discarded).
    ///
    /// # Errors
    ///
    /// Returns [`VcsError::ExternalTool`] for a missing binary or a failing
    /// exit code and [`VcsError::ExternalToolTimeout`] when the timeout
    /// expires.
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>>;
}

/// Runs commands on the host system.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl SystemRunner {
    /// Runner killing commands that exceed `timeout` (`None` waits forever).
    #[must_use]
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn wait(&self, child: &mut GroupChild, invocation: &Invocation) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(command = %invocation.command_line(), ?timeout, "Killing timed out command");
                if let Err(e) = child.kill() {
                    debug!(error = %e, "Process group already gone");
                }
                let _ = child.wait();
                return Err(VcsError::ExternalToolTimeout {
                    command: invocation.command_line(),
                    cwd: invocation.cwd.clone(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Locale for backend tools: untranslated messages so stderr matching
/// works, with a UTF-8 character type so non-ASCII paths survive.
///
/// The caller's effective character type (`LC_ALL`, then `LC_CTYPE`, then
/// `LANG`) is kept when it is UTF-8; otherwise `C.UTF-8` is used.
fn tool_locale<F>(lookup: F) -> [(&'static str, OsString); 2]
where
    F: Fn(&str) -> Option<OsString>,
{
    let ctype = ["LC_ALL", "LC_CTYPE", "LANG"]
        .into_iter()
        .filter_map(|name| lookup(name))
        .find(|value| !value.is_empty())
        .filter(|value| {
            let value = value.to_string_lossy().to_ascii_lowercase();
            value.contains("utf-8") || value.contains("utf8")
        })
        .unwrap_or_else(|| OsString::from("C.UTF-8"));
    [("LC_CTYPE", ctype), ("LC_MESSAGES", OsString::from("C"))]
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buffer);
        }
        buffer
    })
}

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<Vec<u8>> {
        let span = span!(Level::DEBUG, "run", program = %invocation.program);
        let _guard = span.enter();
        let started = Instant::now();

        let executable = which::which(&invocation.program).map_err(|e| {
            invocation.failure(None, format!("{} not found in PATH: {e}", invocation.program))
        })?;

        let stdout = match invocation.capture {
            Capture::Stdout => Stdio::piped(),
            Capture::Discard => Stdio::null(),
        };

        let mut child = Command::new(executable)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .env("HGPLAIN", "1")
            .env_remove("LC_ALL")
            .envs(tool_locale(|name| std::env::var_os(name)))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .group_spawn()
            .map_err(|e| invocation.failure(None, format!("failed to spawn: {e}")))?;

        let stdout_reader = drain(child.inner().stdout.take());
        let stderr_reader = drain(child.inner().stderr.take());

        let status = self.wait(&mut child, invocation)?;
        let output = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        debug!(
            command = %invocation.command_line(),
            cwd = %invocation.cwd.display(),
            code = ?status.code(),
            elapsed = ?started.elapsed(),
            "Command finished"
        );

        match status.code() {
            Some(code) if invocation.ok_codes.contains(&code) => Ok(output),
            code => Err(invocation.failure(
                code,
                String::from_utf8_lossy(&stderr).trim().to_string(),
            )),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_captures_stdout() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = SystemRunner::new(Some(Duration::from_secs(10)));
        let output = runner.run(&Invocation::new("echo", ["hello"], dir.path()))?;
        assert_eq!(output, b"hello\n");
        Ok(())
    }

    #[test]
    fn test_discard_returns_empty() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = SystemRunner::default();
        let output = runner.run(&Invocation::new("echo", ["hello"], dir.path()).discard())?;
        assert!(output.is_empty());
        Ok(())
    }

    #[test]
    fn test_failure_carries_code_and_stderr() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = SystemRunner::default();
        let invocation = Invocation::new("sh", ["-c", "echo boom >&2; exit 3"], dir.path());
        match runner.run(&invocation) {
            Err(VcsError::ExternalTool { code, detail, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(detail, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_allowed_exit_code() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = SystemRunner::default();
        let invocation = Invocation::new("sh", ["-c", "exit 1"], dir.path()).allow_code(1);
        assert!(runner.run(&invocation).is_ok());
        Ok(())
    }

    #[test]
    fn test_missing_binary() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = SystemRunner::default();
        let invocation = Invocation::new("vcstat-no-such-tool", ["x"], dir.path());
        assert!(matches!(
            runner.run(&invocation),
            Err(VcsError::ExternalTool { code: None, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_timeout_kills_command() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let runner = SystemRunner::new(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let result = runner.run(&Invocation::new("sleep", ["5"], dir.path()));
        assert!(matches!(result, Err(VcsError::ExternalToolTimeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
        Ok(())
    }

    fn locale(vars: &[(&str, &str)]) -> Vec<(&'static str, String)> {
        tool_locale(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| OsString::from(value))
        })
        .into_iter()
        .map(|(key, value)| (key, value.to_string_lossy().into_owned()))
        .collect()
    }

    #[test]
    fn test_locale_keeps_utf8_ctype() {
        let env = locale(&[("LC_ALL", "en_US.UTF-8"), ("LANG", "de_DE.ISO-8859-1")]);
        assert_eq!(
            env,
            [
                ("LC_CTYPE", String::from("en_US.UTF-8")),
                ("LC_MESSAGES", String::from("C")),
            ]
        );

        let env = locale(&[("LC_ALL", ""), ("LANG", "fr_FR.utf8")]);
        assert_eq!(env[0], ("LC_CTYPE", "fr_FR.utf8".into()));
    }

    #[test]
    fn test_locale_falls_back_to_c_utf8() {
        assert_eq!(locale(&[])[0], ("LC_CTYPE", "C.UTF-8".into()));
        assert_eq!(locale(&[("LC_ALL", "C")])[0], ("LC_CTYPE", "C.UTF-8".into()));
        assert_eq!(locale(&[("LANG", "POSIX")])[0], ("LC_CTYPE", "C.UTF-8".into()));
    }

    #[test]
    fn test_non_ascii_file_name() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("café.txt"), "crème\n")?;
        let runner = SystemRunner::default();

        let output = runner.run(&Invocation::new("cat", ["café.txt"], dir.path()))?;
        assert_eq!(String::from_utf8(output)?, "crème\n");

        let script = r#"printf '%s|%s|%s' "${LC_ALL-unset}" "$LC_CTYPE" "$LC_MESSAGES""#;
        let output = runner.run(&Invocation::new("sh", ["-c", script], dir.path()))?;
        let env = String::from_utf8(output)?;
        let fields: Vec<&str> = env.split('|').collect();
        assert_eq!(fields[0], "unset");
        assert!(fields[1].to_ascii_lowercase().contains("utf"));
        assert_eq!(fields[2], "C");
        Ok(())
    }

    #[test]
    fn test_command_line() {
        let invocation = Invocation::new("git", ["status", "--porcelain"], Path::new("/r"));
        assert_eq!(invocation.command_line(), "git status --porcelain");
    }
}
