//! Typed remote install sequence.
//!
//! Each step is either critical (its failure ends the remote shell with
//! status 1) or best effort (its failure prints a warning and the chain
//! goes on). The policy is written out per step when rendering instead of
//! relying on `&&`/`||` precedence across the whole chain.

use std::borrow::Cow;

use serde::Serialize;
use thiserror::Error;

use crate::config::{ConfigError, LocalLayout, RemoteLayout};

/// Prefix of the note printed when a critical step fails.
pub const FAILURE_NOTE_PREFIX: &str = "[nexus-deploy] step";

/// Sequence build error.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("Failed to quote command: {0}")]
    Quote(#[from] shlex::QuoteError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What happens when a step exits non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum StepPolicy {
    /// Abort the remaining chain.
    Critical,
    /// Print the warning and continue.
    BestEffort { warning: String },
}

/// One remote shell statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub label: String,
    pub command: String,
    #[serde(flatten)]
    pub policy: StepPolicy,
}

impl Step {
    /// A step whose failure halts the chain.
    #[must_use]
    pub fn critical(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            policy: StepPolicy::Critical,
        }
    }

    /// A step whose failure only prints `warning`.
    #[must_use]
    pub fn best_effort(
        label: impl Into<String>,
        command: impl Into<String>,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
            policy: StepPolicy::BestEffort {
                warning: warning.into(),
            },
        }
    }

    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self.policy, StepPolicy::Critical)
    }

    fn render(&self, number: usize, total: usize) -> Result<String, SequenceError> {
        match &self.policy {
            StepPolicy::Critical => {
                let note = format!("{FAILURE_NOTE_PREFIX} {number}/{total} failed: {}", self.label);
                Ok(format!("{} || {{ echo {}; exit 1; }}", self.command, quote(&note)?))
            }
            StepPolicy::BestEffort { warning } => {
                Ok(format!("{} || echo {}", self.command, quote(warning)?))
            }
        }
    }
}

/// Ordered list of remote steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandSequence {
    steps: Vec<Step>,
}

impl CommandSequence {
    #[must_use]
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The stock install sequence: stop service, unpack, install, fix
    /// ownership, restart, clean up.
    ///
    /// # Errors
    /// Returns error if a path cannot be shell-quoted or has no file name.
    pub fn install(local: &LocalLayout, remote: &RemoteLayout) -> Result<Self, SequenceError> {
        let exe_name = local.executable_name()?;
        let assets_name = local.assets_name()?;

        let work_dir = quote(&remote.work_dir)?;
        let bundle = quote(&remote.bundle_path)?;
        let service = quote(&remote.service)?;
        let exe_dest = quote(&remote.executable_path)?;
        let assets_dir = quote(&remote.assets_dir)?;
        let staged_exe = quote(&join_remote(&remote.work_dir, &exe_name))?;
        let staged_assets = quote(&join_remote(&remote.work_dir, &assets_name))?;
        let installed_assets = quote(&join_remote(&remote.assets_dir, &assets_name))?;
        let assets_parent = quote(&format!("{}/", remote.assets_dir.trim_end_matches('/')))?;
        let owner = quote(&remote.owner)?;

        Ok(Self::new()
            .step(Step::critical(
                "announce start",
                format!("echo {}", quote("Starting remote update...")?),
            ))
            .step(Step::best_effort(
                "stop service",
                format!("sudo systemctl stop {service}"),
                "Service warn",
            ))
            .step(Step::critical("create work dir", format!("mkdir -p {work_dir}")))
            .step(Step::critical(
                "extract bundle",
                format!("tar -xzf {bundle} -C {work_dir}"),
            ))
            .step(Step::critical(
                "install executable",
                format!("sudo cp {staged_exe} {exe_dest}"),
            ))
            .step(Step::critical(
                "mark executable",
                format!("sudo chmod +x {exe_dest}"),
            ))
            .step(Step::critical(
                "remove old assets",
                format!("sudo rm -rf {installed_assets}"),
            ))
            .step(Step::critical(
                "install assets",
                format!("sudo cp -r {staged_assets} {assets_parent}"),
            ))
            .step(Step::best_effort(
                "fix ownership",
                format!("sudo chown -R {owner} {assets_dir}"),
                "chown warn",
            ))
            .step(Step::critical(
                "start service",
                format!("sudo systemctl start {service}"),
            ))
            .step(Step::critical(
                "announce finish",
                format!("echo {}", quote("DEPLOYMENT FINISHED")?),
            ))
            .step(Step::critical(
                "clean up",
                format!("rm -rf {work_dir} {bundle}"),
            )))
    }

    /// Render the sequence as one shell command line.
    ///
    /// # Errors
    /// Returns error if a note or warning cannot be shell-quoted.
    pub fn render(&self) -> Result<String, SequenceError> {
        let total = self.steps.len();
        let rendered = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| step.render(i + 1, total))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join("; "))
    }
}

fn quote(s: &str) -> Result<String, SequenceError> {
    Ok(shlex::try_quote(s).map(Cow::into_owned)?)
}

fn join_remote(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn run_sh(script: &str) -> (String, i32) {
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(script)
            .output()
            .unwrap();
        (
            String::from_utf8_lossy(&output.stdout).into_owned(),
            output.status.code().unwrap_or(-1),
        )
    }

    #[test]
    fn test_install_sequence_shape() {
        let seq = CommandSequence::install(&LocalLayout::default(), &RemoteLayout::default()).unwrap();
        assert_eq!(seq.len(), 12);

        let best_effort: Vec<&str> = seq
            .steps()
            .iter()
            .filter(|s| !s.is_critical())
            .map(|s| s.label.as_str())
            .collect();
        assert_eq!(best_effort, ["stop service", "fix ownership"]);

        assert_eq!(
            seq.steps()[3].command,
            "tar -xzf /tmp/payload.tar.gz -C /tmp/ut_update"
        );
        assert_eq!(
            seq.steps()[4].command,
            "sudo cp /tmp/ut_update/nexus-linux /usr/bin/ultimate-terminal-nexus"
        );
        assert_eq!(
            seq.steps()[7].command,
            "sudo cp -r /tmp/ut_update/public /usr/share/ultimate-terminal/"
        );
    }

    #[test]
    fn test_paths_are_quoted() {
        let remote = RemoteLayout {
            work_dir: "/tmp/my update".into(),
            ..RemoteLayout::default()
        };
        let seq = CommandSequence::install(&LocalLayout::default(), &remote).unwrap();
        assert_eq!(seq.steps()[2].command, "mkdir -p '/tmp/my update'");
    }

    #[test]
    fn test_render_marks_policies() {
        let seq = CommandSequence::new()
            .step(Step::critical("one", "true"))
            .step(Step::best_effort("two", "false", "two warn"));
        let script = seq.render().unwrap();
        assert_eq!(
            script,
            "true || { echo '[nexus-deploy] step 1/2 failed: one'; exit 1; }; false || echo 'two warn'"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_critical_failure_stops_chain() {
        let seq = CommandSequence::new()
            .step(Step::critical("first", "echo first"))
            .step(Step::critical("extract bundle", "false"))
            .step(Step::critical("third", "echo third"))
            .step(Step::best_effort("fourth", "echo fourth", "fourth warn"));

        let (stdout, code) = run_sh(&seq.render().unwrap());
        assert_eq!(code, 1);
        assert!(stdout.contains("first"));
        assert!(stdout.contains("step 2/4 failed: extract bundle"));
        assert!(!stdout.contains("third"));
        assert!(!stdout.contains("fourth"));
    }

    #[cfg(unix)]
    #[test]
    fn test_best_effort_failure_continues() {
        let seq = CommandSequence::new()
            .step(Step::best_effort("stop service", "false", "Service warn"))
            .step(Step::critical("next", "echo next"));

        let (stdout, code) = run_sh(&seq.render().unwrap());
        assert_eq!(code, 0);
        assert!(stdout.contains("Service warn"));
        assert!(stdout.contains("next"));
    }

    #[cfg(unix)]
    #[test]
    fn test_best_effort_does_not_mask_earlier_critical() {
        let seq = CommandSequence::new()
            .step(Step::critical("copy", "false"))
            .step(Step::best_effort("chown", "false", "chown warn"))
            .step(Step::critical("start", "echo started"));

        let (stdout, code) = run_sh(&seq.render().unwrap());
        assert_eq!(code, 1);
        assert!(!stdout.contains("chown warn"));
        assert!(!stdout.contains("started"));
    }
}
