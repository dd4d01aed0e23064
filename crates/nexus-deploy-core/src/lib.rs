//! Core abstractions for nexus deployments.
//!
//! This crate provides the fundamental building blocks:
//! - `DeployConfig` - Target, local and remote layout, session tuning
//! - `Credential` - Zeroized secret fed to password prompts
//! - `CommandSequence` - Typed remote install steps
//! - `SessionRunner` trait and `SessionOutcome`

pub mod command;
pub mod config;
pub mod credential;
pub mod sequence;
pub mod traits;

pub use command::CommandParts;
pub use config::{ConfigError, DeployConfig, LocalLayout, RemoteLayout, SessionSettings, TargetConfig};
pub use credential::Credential;
pub use sequence::{CommandSequence, SequenceError, Step, StepPolicy};
pub use traits::{AuthFailure, AuthState, ExitSummary, RunnerError, SessionOutcome, SessionRunner};
