//! Error types for repository discovery, backend invocation and parsing.
//!
//! Library code returns [`VcsError`]; the CLI and configuration layers wrap it
//! with `anyhow` context. Failures of the external tools are further
//! classified from their stderr into a [`FailureKind`] so the CLI can attach
//! actionable hints.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T, E = VcsError> = std::result::Result<T, E>;

/// Errors raised by the VCS engine.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The external tool exited with a failure code or could not be started.
    #[error("`{command}` failed in {}{}: {detail}", cwd.display(), exit_suffix(*code))]
    ExternalTool {
        /// Full command line.
        command: String,
        /// Working directory the command ran in.
        cwd: PathBuf,
        /// Exit code, `None` when the process never ran or was signalled.
        code: Option<i32>,
        /// Captured stderr or the spawn error.
        detail: String,
    },

    /// The external tool did not finish within the configured timeout.
    #[error("`{command}` timed out after {} in {}", humantime::format_duration(*timeout), cwd.display())]
    ExternalToolTimeout {
        /// Full command line.
        command: String,
        /// Working directory the command ran in.
        cwd: PathBuf,
        /// Timeout that expired.
        timeout: Duration,
    },

    /// A revision specifier matched more than one revision.
    #[error("ambiguous revision: {0}")]
    AmbiguousRevision(String),

    /// A revision specifier matched nothing.
    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    /// The marker directory exists but cannot be read.
    #[error("repository metadata is unreadable: {}", .0.display())]
    RepositoryUnreadable(PathBuf),

    /// The marker directory of a known root disappeared.
    #[error("repository vanished: {}", .0.display())]
    RepositoryVanished(PathBuf),

    /// The path is not inside any enabled repository.
    #[error("not inside a repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// Symlink resolution looped.
    #[error("symlink cycle while resolving {}", .0.display())]
    SymlinkCycle(PathBuf),

    /// The backend has no equivalent for the requested operation.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        /// Backend name.
        backend: &'static str,
        /// Operation name.
        operation: &'static str,
    },

    /// Tool output could not be understood.
    #[error("unexpected {backend} output: {detail}")]
    Parse {
        /// Backend name.
        backend: &'static str,
        /// What went wrong.
        detail: String,
    },

    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn exit_suffix(code: Option<i32>) -> String {
    code.map(|code| format!(" (exit {code})")).unwrap_or_default()
}

impl VcsError {
    /// Build a [`VcsError::Parse`] for `backend`.
    pub fn parse(backend: &'static str, detail: impl Into<String>) -> Self {
        Self::Parse {
            backend,
            detail: detail.into(),
        }
    }

    /// Classify a tool failure from its stderr. Errors that did not come
    /// from an external tool yield `None`.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::ExternalTool { detail, .. } => Some(FailureKind::from_stderr(detail)),
            Self::ExternalToolTimeout { .. } => Some(FailureKind::Network),
            _ => None,
        }
    }

    /// Message with remediation hints, for display by the CLI.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.failure_kind() {
            Some(kind) => format!("{self}\n\nSuggestions:\n{}", kind.hints()),
            None => self.to_string(),
        }
    }
}

/// Coarse category of an external tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// DNS, connection or timeout problems.
    Network,
    /// Rejected credentials.
    Authentication,
    /// Unknown branch, revision, remote or path.
    NotFound,
    /// Non-fast-forward pushes or merge conflicts.
    Conflict,
    /// Local filesystem permissions.
    Permission,
    /// Malformed revision or reference.
    InvalidRef,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Categorize stderr of a failed VCS command.
    #[must_use]
    pub fn from_stderr(stderr: &str) -> Self {
        let stderr = stderr.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|needle| stderr.contains(needle));

        if any(&[
            "could not resolve host",
            "connection timed out",
            "network is unreachable",
            "failed to connect",
            "connection refused",
            "unable to connect",
        ]) {
            Self::Network
        } else if any(&[
            "authentication failed",
            "authorization failed",
            "publickey",
            "access denied",
            "invalid credentials",
            "could not read username",
        ]) {
            Self::Authentication
        } else if any(&[
            "permission denied (os)",
            "permission denied",
            "unable to create",
            "read-only",
            "cannot open",
        ]) {
            Self::Permission
        } else if any(&[
            "non-fast-forward",
            "rejected",
            "conflict",
            "failed to push some refs",
            "unresolved merge",
        ]) {
            Self::Conflict
        } else if any(&[
            "invalid ref",
            "malformed",
            "bad revision",
            "ambiguous argument",
            "unknown revision",
            "invalid revision",
        ]) {
            Self::InvalidRef
        } else if any(&[
            "does not exist",
            "not found",
            "couldn't find remote ref",
            "no such",
            "no repository found",
        ]) {
            Self::NotFound
        } else {
            Self::Other
        }
    }

    /// Actionable suggestions, one per line.
    #[must_use]
    pub const fn hints(self) -> &'static str {
        match self {
            Self::Network => {
                " - Check your network connection\n \
                 - Verify the remote URL (vcstat remote)\n \
                 - Raise command_timeout_ms for slow servers"
            }
            Self::Authentication => {
                " - Verify your SSH key is loaded (ssh-add -l)\n \
                 - Check that your credentials have not expired"
            }
            Self::NotFound => {
                " - Verify the revision, branch or path exists\n \
                 - List recent revisions with vcstat log"
            }
            Self::Conflict => {
                " - Pull the latest changes first (vcstat pull)\n \
                 - Resolve conflicted files, then add and commit them"
            }
            Self::Permission => {
                " - Check file and directory permissions\n \
                 - Check whether another process holds the repository lock"
            }
            Self::InvalidRef => {
                " - Check the revision syntax for this backend\n \
                 - Use a full revision id from vcstat log"
            }
            Self::Other => " - Re-run with -v for the full command trace",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Network => "network error",
            Self::Authentication => "authentication error",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Permission => "permission denied",
            Self::InvalidRef => "invalid reference",
            Self::Other => "error",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_error(detail: &str) -> VcsError {
        VcsError::ExternalTool {
            command: "git push".into(),
            cwd: PathBuf::from("/repo"),
            code: Some(1),
            detail: detail.into(),
        }
    }

    #[test]
    fn test_network_error_detection() {
        let kind = FailureKind::from_stderr("fatal: Could not resolve host: example.org");
        assert_eq!(kind, FailureKind::Network);
    }

    #[test]
    fn test_auth_error_detection() {
        let kind = FailureKind::from_stderr(
            "fatal: Authentication failed for 'https://example.org/repo.git'",
        );
        assert_eq!(kind, FailureKind::Authentication);
    }

    #[test]
    fn test_conflict_error_detection() {
        let stderr = "error: failed to push some refs\nhint: Updates were rejected";
        assert_eq!(FailureKind::from_stderr(stderr), FailureKind::Conflict);
    }

    #[test]
    fn test_bad_revision_is_invalid_ref() {
        let stderr = "fatal: bad revision 'nope'";
        assert_eq!(FailureKind::from_stderr(stderr), FailureKind::InvalidRef);
    }

    #[test]
    fn test_not_found_error_detection() {
        let stderr = "abort: repository /nowhere not found";
        assert_eq!(FailureKind::from_stderr(stderr), FailureKind::NotFound);
    }

    #[test]
    fn test_user_message_carries_hints() {
        let message = tool_error("fatal: Could not resolve host").user_message();
        assert!(message.contains("git push"));
        assert!(message.contains("(exit 1)"));
        assert!(message.contains("Suggestions"));
    }

    #[test]
    fn test_non_tool_errors_have_no_kind() {
        let error = VcsError::RevisionNotFound("abc".into());
        assert!(error.failure_kind().is_none());
        assert_eq!(error.user_message(), "revision not found: abc");
    }

    #[test]
    fn test_timeout_message() {
        let error = VcsError::ExternalToolTimeout {
            command: "hg status".into(),
            cwd: PathBuf::from("/r"),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(error.to_string(), "`hg status` timed out after 1s 500ms in /r");
    }
}
