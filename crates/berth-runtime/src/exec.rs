//! In-container command execution types.

use serde::{Deserialize, Serialize};

/// A command to execute inside a container.
///
/// The command is a single string interpreted by a shell (`/bin/sh -c`), so
/// pipes, redirects, and other metacharacters behave as they would in an
/// interactive session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Shell command string.
    pub command: String,

    /// User to run the command as.
    pub user: Option<String>,

    /// When set, return immediately without waiting for completion or
    /// collecting output.
    pub detach: bool,
}

impl ExecRequest {
    /// Creates a request for the given shell command.
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            user: None,
            detach: false,
        }
    }

    /// Sets the user to run as.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Runs the command detached.
    pub fn detached(mut self) -> Self {
        self.detach = true;
        self
    }
}

/// Result of an exec invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecResult {
    /// Exit code of the command. `None` when the exec was detached and the
    /// outcome is not yet known.
    pub exit_code: Option<i64>,

    /// Combined stdout and stderr text, in arrival order. Empty for
    /// detached invocations.
    pub output: String,
}

impl ExecResult {
    /// Result for a detached invocation whose outcome is still pending.
    pub fn pending() -> Self {
        Self {
            exit_code: None,
            output: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = ExecRequest::shell("echo hi | wc -c").user("root").detached();
        assert_eq!(req.command, "echo hi | wc -c");
        assert_eq!(req.user.as_deref(), Some("root"));
        assert!(req.detach);
    }

    #[test]
    fn test_pending_result() {
        let result = ExecResult::pending();
        assert!(result.exit_code.is_none());
        assert!(result.output.is_empty());
    }
}
