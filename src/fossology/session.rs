//! Remote session abstraction.
//!
//! # Architecture
//!
//! - [`RemoteSession`]: an authenticated connection to the scanning host. Held
//!   by the pool while idle and checked out for a single command.
//! - [`ExecChannel`]: one command execution on a session.
//! - [`SessionConnector`]: opens new sessions using the identity registry.
//! - [`SshClientHandler`]: russh client handler that consults a
//!   [`HostKeyVerifier`] before accepting the server key.
//!
//! The russh-backed implementations live in [`crate::fossology::client`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use russh::{client, keys};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::fossology::credentials::IdentityRegistry;
use crate::fossology::error::SessionError;
use crate::fossology::hostkey::{HostKeyVerdict, HostKeyVerifier};

/// Session metadata for logging and pool bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub connected_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            host: host.into(),
            port,
            username: username.into(),
            connected_at: Utc::now(),
        }
    }
}

/// Message received on an exec channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    Eof,
    Closed,
}

/// A single command execution on a remote session.
#[async_trait]
pub trait ExecChannel: Send {
    /// Start `command` on the remote side.
    async fn exec(&mut self, command: &str) -> Result<(), SessionError>;

    /// Stream `input` to the command's stdin, then signal end of input.
    async fn send_stdin(
        &mut self,
        input: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(), SessionError>;

    /// Next message from the remote side; `None` once the channel is gone.
    ///
    /// Must be cancel safe: the executor polls it under short timeouts.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    async fn close(&mut self);
}

/// Authenticated connection to the scanning host.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    fn info(&self) -> &SessionInfo;

    fn is_connected(&self) -> bool;

    async fn open_exec(&self) -> Result<Box<dyn ExecChannel>, SessionError>;

    async fn disconnect(&self);
}

/// Opens new remote sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connect and authenticate with the identity held by `registry`.
    async fn connect(
        &self,
        registry: &mut IdentityRegistry,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SessionError>;
}

/// Client handler for russh that verifies host keys.
///
/// The SHA-256 fingerprint of the server key is checked against the verifier;
/// only a [`HostKeyVerdict::Trusted`] verdict lets the handshake continue.
pub struct SshClientHandler {
    host: String,
    verifier: Arc<dyn HostKeyVerifier>,
}

impl SshClientHandler {
    pub fn new(host: impl Into<String>, verifier: Arc<dyn HostKeyVerifier>) -> Self {
        Self {
            host: host.into(),
            verifier,
        }
    }
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key
            .fingerprint(keys::HashAlg::Sha256)
            .to_string();

        match self.verifier.verify(&self.host, &fingerprint).await {
            HostKeyVerdict::Trusted => {
                debug!("Host key {} of {} trusted", fingerprint, self.host);
                Ok(true)
            }
            verdict => {
                warn!(
                    "Rejecting host key {} of {}: {:?}",
                    fingerprint, self.host, verdict
                );
                Ok(false)
            }
        }
    }
}
