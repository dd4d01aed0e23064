//! Interactive session driver.
//!
//! Spawns a program on the slave side of a PTY and drives it to completion:
//! output is relayed to the operator unchanged, password prompts are
//! answered through the master side, and the child is always reaped.

use std::{
    io::{Read, Write},
    path::Path,
    thread,
};

use nexus_deploy_core::{Credential, ExitSummary, SessionOutcome, SessionSettings};
use portable_pty::{native_pty_system, Child, CommandBuilder, PtySize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    decode::LenientDecoder,
    responder::{PromptResponder, Response},
};

/// Bytes requested per PTY read.
const READ_CHUNK: usize = 1024;

const PTY_ROWS: u16 = 24;
const PTY_COLS: u16 = 80;

/// PTY session error.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("Failed to open PTY: {0}")]
    Open(String),
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("Failed to attach to PTY master: {0}")]
    Attach(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reaper task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Runs one interactive subprocess per call.
#[derive(Debug, Clone)]
pub struct SessionDriver {
    credential: Credential,
    settings: SessionSettings,
}

impl SessionDriver {
    #[must_use]
    pub const fn new(credential: Credential, settings: SessionSettings) -> Self {
        Self {
            credential,
            settings,
        }
    }

    /// Run `program` with `args` to completion, relaying its output to
    /// stdout.
    ///
    /// # Errors
    /// Returns error if the PTY cannot be set up, the program cannot be
    /// spawned, or writing to the operator or the terminal fails.
    pub async fn run(&self, program: &Path, args: &[String]) -> Result<SessionOutcome, PtyError> {
        let mut stdout = std::io::stdout();
        self.run_with_sink(program, args, &mut stdout).await
    }

    /// Like `run`, relaying output to `sink` instead of stdout.
    ///
    /// # Errors
    /// See `run`.
    pub async fn run_with_sink<W>(
        &self,
        program: &Path,
        args: &[String],
        sink: &mut W,
    ) -> Result<SessionOutcome, PtyError>
    where
        W: Write + Send,
    {
        let session_id = Uuid::new_v4();
        tracing::debug!(%session_id, program = %program.display(), "Opening PTY session");

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        // portable-pty defaults to $HOME, relative paths must keep working
        cmd.cwd(std::env::current_dir()?);

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn {
                program: program.display().to_string(),
                reason: e.to_string(),
            })?;
        // Our copy of the slave would keep the stream open after the child exits.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Attach(e.to_string()))?;
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Attach(e.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        thread::Builder::new()
            .name("nexus-pty-reader".into())
            .spawn(move || pump(reader, &tx))?;

        let mut decoder = LenientDecoder::new();
        let mut responder = PromptResponder::new(&self.settings, self.credential.clone());
        let poll_interval = self.settings.poll_interval();
        let mut early_exit = None;
        // Set when relaying fails; the child is still torn down before it is returned.
        let mut failure: Option<PtyError> = None;

        loop {
            let chunk = match tokio::time::timeout(poll_interval, rx.recv()).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(_) => {
                    // Quiet for a whole interval. A detached grandchild can hold
                    // the terminal open after our child is gone.
                    match child.try_wait() {
                        Ok(Some(status)) => {
                            tracing::debug!(%session_id, "Child exited while PTY stayed open");
                            early_exit = Some(status);
                            break;
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            failure = Some(e.into());
                            break;
                        }
                    }
                }
            };

            let text = decoder.decode(&chunk);
            if text.is_empty() {
                continue;
            }
            if let Err(e) = write_flush(sink, text.as_bytes()) {
                failure = Some(e.into());
                break;
            }

            match responder.observe(&text) {
                Response::Ignore => {}
                Response::SendCredential => {
                    tracing::debug!(%session_id, writes = responder.writes(), "Answering password prompt");
                    if let Err(e) = write_flush(&mut *writer, &self.credential.response_bytes()) {
                        failure = Some(e.into());
                        break;
                    }
                }
                Response::Abort(reason) => {
                    tracing::warn!(%session_id, %reason, "Giving up on password prompts, killing session");
                    kill_child(child.as_mut(), session_id);
                    break;
                }
            }
        }
        drop(writer);

        if failure.is_some() {
            kill_child(child.as_mut(), session_id);
        }
        let reaped = match early_exit {
            Some(status) => Ok(status),
            None => match tokio::task::spawn_blocking(move || child.wait()).await {
                Ok(waited) => waited.map_err(PtyError::from),
                Err(e) => Err(PtyError::from(e)),
            },
        };
        drop(pair.master);

        if let Some(e) = failure {
            if let Err(reap) = &reaped {
                tracing::warn!(%session_id, error = %reap, "Failed to reap child");
            }
            tracing::warn!(%session_id, error = %e, "PTY session aborted");
            return Err(e);
        }
        let status = reaped?;

        let exit = ExitSummary {
            code: status.exit_code(),
            signal: status.signal().map(str::to_string),
        };
        tracing::debug!(%session_id, %exit, auth = ?responder.state(), "PTY session finished");

        Ok(SessionOutcome {
            exit,
            auth: responder.state(),
            credential_writes: responder.writes(),
        })
    }
}

fn write_flush<W: Write + ?Sized>(out: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(bytes)?;
    out.flush()
}

fn kill_child(child: &mut (dyn Child + Send + Sync), session_id: Uuid) {
    if let Err(e) = child.kill() {
        tracing::debug!(%session_id, error = %e, "Kill failed, child already gone?");
    }
}

/// Forward PTY output until EOF or a read error, then close the channel.
fn pump(mut reader: Box<dyn Read + Send>, tx: &mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                tracing::trace!("PTY read EOF");
                break;
            }
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                // Linux reports EIO on the master once the slave side is gone.
                tracing::trace!(error = %e, "PTY read ended");
                break;
            }
        }
    }
}
