//! PTY session driver for interactive scp/ssh runs.
//!
//! Provides:
//! - `SessionDriver` - Spawn a program on a PTY, relay output, answer prompts
//! - `PromptResponder` - Password prompt state machine
//! - `LenientDecoder` - UTF-8 decoding that drops invalid bytes
//! - Executable resolution utilities

pub mod decode;
pub mod driver;
pub mod responder;
pub mod shell;

pub use decode::LenientDecoder;
pub use driver::{PtyError, SessionDriver};
pub use responder::{PromptResponder, Response};
pub use shell::{resolve_executable_path, resolve_executable_path_blocking};
