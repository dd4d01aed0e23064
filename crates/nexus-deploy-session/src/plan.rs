//! Dry-run view of a deployment.

use std::fmt;

use nexus_deploy_core::{CommandParts, CommandSequence, LocalLayout, RemoteLayout, StepPolicy};
use serde::Serialize;

/// Everything a deployment would do, computed without side effects.
#[derive(Debug, Clone, Serialize)]
pub struct DeployPlan {
    pub host: String,
    pub local: LocalLayout,
    pub remote: RemoteLayout,
    pub upload: CommandParts,
    pub install: CommandParts,
    pub steps: CommandSequence,
}

impl fmt::Display for DeployPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Target: {}", self.host)?;
        writeln!(
            f,
            "Package: {} + {} -> {} (staging {})",
            self.local.executable.display(),
            self.local.assets.display(),
            self.local.bundle.display(),
            self.local.staging_dir.display(),
        )?;
        writeln!(f, "Upload: {}", self.upload.display())?;
        writeln!(f, "Install steps:")?;
        for (i, step) in self.steps.steps().iter().enumerate() {
            let policy = match &step.policy {
                StepPolicy::Critical => "critical".to_string(),
                StepPolicy::BestEffort { warning } => format!("best effort, warns {warning:?}"),
            };
            writeln!(f, "  {:>2}. {} [{policy}]", i + 1, step.command)?;
        }
        Ok(())
    }
}
