//! Remote session execution.
//!
//! Provides:
//! - `CommandBuilder` / `RemoteCommands` - scp and ssh invocations
//! - `PtyRunner` - `SessionRunner` backed by the PTY session driver

pub mod command;
pub mod runner;

pub use command::{CommandBuildError, CommandBuilder, RemoteCommands};
pub use runner::PtyRunner;
