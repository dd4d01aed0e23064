//! Deployment orchestrator.

use std::fmt;

use nexus_deploy_bundle::{Bundle, PackageError, Packager};
use nexus_deploy_core::{
    CommandParts, CommandSequence, ConfigError, DeployConfig, RunnerError, SequenceError,
    SessionOutcome, SessionRunner,
};
use nexus_deploy_executor::{CommandBuildError, RemoteCommands};
use serde::Serialize;

use crate::DeployPlan;

/// Remote session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Upload,
    Install,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Install => f.write_str("install"),
        }
    }
}

/// Deployment error.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Packaging failed: {0}")]
    Package(#[from] PackageError),
    #[error("Install sequence error: {0}")]
    Sequence(#[from] SequenceError),
    #[error("Command build error: {0}")]
    Command(#[from] CommandBuildError),
    #[error("{phase} session could not run: {source}")]
    Runner {
        phase: Phase,
        #[source]
        source: RunnerError,
    },
    #[error("{phase} session failed ({}, auth {:?})", outcome.exit, outcome.auth)]
    SessionFailed { phase: Phase, outcome: SessionOutcome },
    #[error("Packaging task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result of a completed deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub bundle: Bundle,
    pub upload: SessionOutcome,
    pub install: SessionOutcome,
}

/// Runs package, upload and install against one target.
pub struct Deployer<R>
where
    R: SessionRunner,
{
    config: DeployConfig,
    runner: R,
    packager: Packager,
    commands: RemoteCommands,
    sequence: CommandSequence,
}

impl<R> Deployer<R>
where
    R: SessionRunner,
{
    /// Create a deployer.
    ///
    /// # Errors
    /// Returns error if the config is invalid or the install sequence cannot
    /// be built from it.
    pub fn new(config: DeployConfig, runner: R) -> Result<Self, DeployError> {
        config.validate()?;
        let sequence = CommandSequence::install(&config.local, &config.remote)?;
        Ok(Self {
            packager: Packager::new(config.local.clone()),
            commands: RemoteCommands::new(config.target.clone()),
            sequence,
            runner,
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Describe the deployment without touching files or the network.
    ///
    /// # Errors
    /// Returns error if a command cannot be built.
    pub fn plan(&self) -> Result<DeployPlan, DeployError> {
        Ok(DeployPlan {
            host: self.config.target.host.clone(),
            local: self.config.local.clone(),
            remote: self.config.remote.clone(),
            upload: self.upload_command(&self.config.local.bundle)?,
            install: self.install_command()?,
            steps: self.sequence.clone(),
        })
    }

    fn upload_command(&self, bundle: &std::path::Path) -> Result<CommandParts, DeployError> {
        Ok(self.commands.upload(bundle, &self.config.remote.bundle_path)?)
    }

    fn install_command(&self) -> Result<CommandParts, DeployError> {
        Ok(self.commands.exec(&self.sequence.render()?)?)
    }

    /// Package, upload, install. Stops at the first failing phase.
    ///
    /// # Errors
    /// Returns error if packaging fails or a session does not succeed.
    pub async fn deploy(&self) -> Result<DeployReport, DeployError> {
        tracing::info!("[1/3] Preparing payload...");
        let packager = self.packager.clone();
        let bundle = tokio::task::spawn_blocking(move || packager.package()).await??;

        tracing::info!(host = %self.config.target.host, "[2/3] Uploading...");
        let upload = self.upload_command(&bundle.path)?;
        let upload = self.run_phase(Phase::Upload, &upload).await?;

        tracing::info!(host = %self.config.target.host, "[3/3] Installing...");
        let install = self.install_command()?;
        let install = self.run_phase(Phase::Install, &install).await?;

        tracing::info!(size_bytes = bundle.size_bytes, "Deployment finished");
        Ok(DeployReport {
            bundle,
            upload,
            install,
        })
    }

    async fn run_phase(
        &self,
        phase: Phase,
        command: &CommandParts,
    ) -> Result<SessionOutcome, DeployError> {
        let outcome = self
            .runner
            .run(command)
            .await
            .map_err(|source| DeployError::Runner { phase, source })?;

        if !outcome.succeeded() {
            tracing::error!(%phase, exit = %outcome.exit, auth = ?outcome.auth, "Session failed");
            return Err(DeployError::SessionFailed { phase, outcome });
        }
        tracing::debug!(%phase, writes = outcome.credential_writes, "Session succeeded");
        Ok(outcome)
    }
}
