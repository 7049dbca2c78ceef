//! Remote command execution with a hard wall-clock timeout.
//!
//! A command runs on a session checked out of the [`SessionPool`]. Stdin is
//! streamed to the command, stdout is copied to the caller's writer, and the
//! channel is polled every [`POLL_INTERVAL`] until it closes or the execution
//! timeout elapses.
//!
//! ## Outcomes
//!
//! - **Completed**: the exit status reported by the server (`-1` if none was
//!   sent). The session goes back to the pool.
//! - **Transport failure**: logged, exit code `-1`. The session is
//!   disconnected.
//! - **Timeout**: [`ExecError::Timeout`], never before the deadline. The
//!   session is disconnected.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, warn};

use crate::fossology::error::{ExecError, SessionError};
use crate::fossology::pool::SessionPool;
use crate::fossology::session::{ChannelEvent, RemoteSession};

/// Interval at which a running command is checked for completion.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

enum RunFailure {
    Timeout,
    Transport(SessionError),
}

impl From<SessionError> for RunFailure {
    fn from(e: SessionError) -> Self {
        RunFailure::Transport(e)
    }
}

pub struct CommandExecutor {
    pool: Arc<SessionPool>,
    connect_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(pool: Arc<SessionPool>, connect_timeout: Duration) -> Self {
        Self {
            pool,
            connect_timeout,
        }
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Run `command` and return its exit code.
    ///
    /// Omitted stdin reads as empty input; omitted stdout is discarded.
    pub async fn run(
        &self,
        command: &str,
        stdin: Option<&mut (dyn AsyncRead + Unpin + Send)>,
        stdout: Option<&mut (dyn AsyncWrite + Unpin + Send)>,
        execution_timeout: Duration,
    ) -> Result<i32, ExecError> {
        let session = match self.pool.acquire(self.connect_timeout).await {
            Ok(session) => session,
            Err(e) => {
                error!("Unable to obtain session for '{}': {}", command, e);
                return Ok(-1);
            }
        };

        // The execution budget starts once a session is in hand.
        let deadline = Instant::now() + execution_timeout;

        match drive(session.as_ref(), command, stdin, stdout, deadline).await {
            Ok(exit_code) => {
                debug!("'{}' finished with exit code {}", command, exit_code);
                self.pool.release(session).await;
                Ok(exit_code)
            }
            Err(RunFailure::Timeout) => {
                warn!(
                    "'{}' timed out after {:?}, disconnecting session {}",
                    command,
                    execution_timeout,
                    session.info().session_id
                );
                session.disconnect().await;
                Err(ExecError::Timeout(execution_timeout))
            }
            Err(RunFailure::Transport(e)) => {
                error!("'{}' failed: {}", command, e);
                session.disconnect().await;
                Ok(-1)
            }
        }
    }
}

async fn drive(
    session: &dyn RemoteSession,
    command: &str,
    stdin: Option<&mut (dyn AsyncRead + Unpin + Send)>,
    stdout: Option<&mut (dyn AsyncWrite + Unpin + Send)>,
    deadline: Instant,
) -> Result<i32, RunFailure> {
    let mut channel = session.open_exec().await?;
    channel.exec(command).await?;

    let mut empty = tokio::io::empty();
    let input: &mut (dyn AsyncRead + Unpin + Send) = match stdin {
        Some(reader) => reader,
        None => &mut empty,
    };
    match timeout_at(deadline, channel.send_stdin(input)).await {
        Ok(sent) => sent?,
        Err(_) => {
            channel.close().await;
            return Err(RunFailure::Timeout);
        }
    }

    let mut sink = tokio::io::sink();
    let output: &mut (dyn AsyncWrite + Unpin + Send) = match stdout {
        Some(writer) => writer,
        None => &mut sink,
    };

    let mut exit_code: i32 = -1;
    loop {
        let now = Instant::now();
        if now >= deadline {
            channel.close().await;
            return Err(RunFailure::Timeout);
        }

        let wake = (now + POLL_INTERVAL).min(deadline);
        match timeout_at(wake, channel.next_event()).await {
            // Poll tick without news
            Err(_) => continue,
            Ok(None) | Ok(Some(ChannelEvent::Closed)) => break,
            Ok(Some(ChannelEvent::Stdout(data))) => {
                output
                    .write_all(&data)
                    .await
                    .map_err(|e| SessionError::Channel(format!("Failed to write output: {}", e)))?;
            }
            Ok(Some(ChannelEvent::Stderr(data))) => {
                debug!("stderr of '{}': {}", command, String::from_utf8_lossy(&data));
            }
            Ok(Some(ChannelEvent::ExitStatus(status))) => {
                exit_code = status as i32;
            }
            Ok(Some(ChannelEvent::Eof)) => {}
        }
    }

    output
        .flush()
        .await
        .map_err(|e| SessionError::Channel(format!("Failed to flush output: {}", e)))?;
    channel.close().await;
    Ok(exit_code)
}
