//! Core traits for running remote sessions.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::CommandParts;

/// Why the prompt responder gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    /// The remote side rejected the credential.
    Rejected,
    /// Prompts kept coming without any output confirming the last answer.
    TooManyPrompts,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => f.write_str("credential rejected"),
            Self::TooManyPrompts => f.write_str("too many unconfirmed password prompts"),
        }
    }
}

/// Password exchange state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    /// No prompt seen yet.
    AwaitingPrompt,
    /// Credential written, nothing confirmed it yet.
    CredentialSent { attempts: u32 },
    /// Output after the last credential showed it was accepted.
    Confirmed,
    /// Terminal failure; no further credential writes.
    Failed { reason: AuthFailure },
}

impl AuthState {
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// How the subprocess exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitSummary {
    /// Exit code (non-zero when killed by a signal).
    pub code: u32,
    /// Signal name, if the process was terminated by one.
    pub signal: Option<String>,
}

impl ExitSummary {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.signal {
            Some(signal) => write!(f, "terminated by {signal}"),
            None => write!(f, "exit code {}", self.code),
        }
    }
}

/// Result of one remote session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub exit: ExitSummary,
    pub auth: AuthState,
    /// Number of times the credential was written to the terminal.
    pub credential_writes: u32,
}

impl SessionOutcome {
    /// True when the process exited cleanly and authentication did not fail.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.exit.success() && !self.auth.is_failed()
    }
}

/// Runner error.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("Session failed to start: {0}")]
    SpawnFailed(String),
    #[error("Session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for running one interactive remote session to completion.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    /// Run the command, answering password prompts, and reap it.
    async fn run(&self, command: &CommandParts) -> Result<SessionOutcome, RunnerError>;
}
