//! Command building utilities.

use std::path::Path;

use nexus_deploy_core::{CommandParts, TargetConfig};
use thiserror::Error;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("No remote host configured")]
    MissingHost,
}

/// Builder for constructing commands.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Base executable command, may carry its own arguments.
    pub base: String,
    /// Optional parameters to append.
    pub params: Option<Vec<String>>,
}

impl CommandBuilder {
    /// Create a new command builder.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: None,
        }
    }

    /// Add parameters.
    #[must_use]
    pub fn params<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Extend parameters.
    #[must_use]
    pub fn extend_params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let extra: Vec<String> = more.into_iter().map(Into::into).collect();
        match &mut self.params {
            Some(p) => p.extend(extra),
            None => self.params = Some(extra),
        }
        self
    }

    /// Build the command with trailing positional arguments.
    ///
    /// # Errors
    /// Returns error if the base cannot be split or nothing is left.
    pub fn build(&self, additional_args: &[String]) -> Result<CommandParts, CommandBuildError> {
        let mut parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        if let Some(ref params) = self.params {
            parts.extend(params.iter().cloned());
        }
        parts.extend(additional_args.iter().cloned());

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

/// Builds the scp upload and ssh exec invocations for one target.
#[derive(Debug, Clone)]
pub struct RemoteCommands {
    target: TargetConfig,
}

impl RemoteCommands {
    #[must_use]
    pub const fn new(target: TargetConfig) -> Self {
        Self { target }
    }

    fn host(&self) -> Result<&str, CommandBuildError> {
        let host = self.target.host.trim();
        if host.is_empty() {
            Err(CommandBuildError::MissingHost)
        } else {
            Ok(host)
        }
    }

    fn host_key_options(&self) -> Vec<String> {
        if self.target.verify_host_key {
            Vec::new()
        } else {
            [
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
            ]
            .map(String::from)
            .to_vec()
        }
    }

    fn port_options(&self, flag: &str) -> Vec<String> {
        self.target
            .port
            .map(|port| vec![flag.to_string(), port.to_string()])
            .unwrap_or_default()
    }

    /// `scp <opts> <local> <host>:<remote_path>`.
    ///
    /// # Errors
    /// Returns error if the host is missing or the scp base is invalid.
    pub fn upload(&self, local: &Path, remote_path: &str) -> Result<CommandParts, CommandBuildError> {
        let destination = format!("{}:{remote_path}", self.host()?);
        CommandBuilder::new(self.target.scp_program.as_str())
            .params(self.port_options("-P"))
            .extend_params(self.host_key_options())
            .build(&[local.to_string_lossy().into_owned(), destination])
    }

    /// `ssh -tt <opts> <host> <script>`.
    ///
    /// `-tt` forces a remote terminal so sudo prompts are interactive.
    ///
    /// # Errors
    /// Returns error if the host is missing or the ssh base is invalid.
    pub fn exec(&self, script: &str) -> Result<CommandParts, CommandBuildError> {
        let host = self.host()?.to_string();
        CommandBuilder::new(self.target.ssh_program.as_str())
            .params(["-tt"])
            .extend_params(self.port_options("-p"))
            .extend_params(self.host_key_options())
            .build(&[host, script.to_string()])
    }
}
