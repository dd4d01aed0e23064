//! PTY-backed session runner.

use async_trait::async_trait;
use nexus_deploy_core::{
    CommandParts, Credential, RunnerError, SessionOutcome, SessionRunner, SessionSettings,
};
use nexus_deploy_pty::{resolve_executable_path, PtyError, SessionDriver};

/// Runs scp/ssh on a PTY, answering password prompts with the credential.
#[derive(Debug, Clone)]
pub struct PtyRunner {
    driver: SessionDriver,
}

impl PtyRunner {
    #[must_use]
    pub const fn new(credential: Credential, settings: SessionSettings) -> Self {
        Self {
            driver: SessionDriver::new(credential, settings),
        }
    }
}

#[async_trait]
impl SessionRunner for PtyRunner {
    async fn run(&self, command: &CommandParts) -> Result<SessionOutcome, RunnerError> {
        let program = resolve_executable_path(&command.program)
            .await
            .ok_or_else(|| RunnerError::ExecutableNotFound(command.program.clone()))?;

        tracing::info!(command = %command.display(), "[CMD]");
        self.driver
            .run(&program, &command.args)
            .await
            .map_err(|e| match e {
                PtyError::Io(io) => RunnerError::Io(io),
                other => RunnerError::SpawnFailed(other.to_string()),
            })
    }
}
