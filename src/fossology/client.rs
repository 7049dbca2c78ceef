//! russh-backed sessions to the scanning host.
//!
//! ## Connection Lifecycle
//!
//! 1. **Address Parsing**: Parse the configured address into host and port.
//!    Supports `host:port` format with default port 22 if not specified.
//! 2. **Client Configuration**: keepalive every 30 seconds, no inactivity
//!    timeout so idle pooled sessions stay open until the server drops them.
//! 3. **Connection Establishment**: TCP connect and handshake bounded by the
//!    pool's connect timeout. The server key is checked by [`SshClientHandler`].
//! 4. **Authentication**: public key authentication with the identity from the
//!    [`IdentityRegistry`].
//!
//! Connection attempts are not retried here; [`SessionError::is_retryable`]
//! lets callers decide.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelMsg, Disconnect, client, keys};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use crate::fossology::credentials::IdentityRegistry;
use crate::fossology::error::SessionError;
use crate::fossology::hostkey::HostKeyVerifier;
use crate::fossology::session::{
    ChannelEvent, ExecChannel, RemoteSession, SessionConnector, SessionInfo, SshClientHandler,
};

/// Build russh client configuration.
///
/// `None` disables the inactivity timeout; keepalive stays at 30 seconds with
/// at most 3 unanswered keepalives.
pub(crate) fn build_client_config(inactivity_timeout: Option<Duration>) -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Parse address string into host and port components.
///
/// Uses `rsplit_once` to handle IPv6 addresses correctly (e.g., `[::1]:22`).
pub(crate) fn parse_address(address: &str) -> Result<(String, u16), String> {
    if let Some((host, port_str)) = address.rsplit_once(':') {
        let port = port_str
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {}", e))?;
        Ok((host.to_string(), port))
    } else {
        Ok((address.to_string(), 22))
    }
}

/// Opens authenticated russh sessions to one scanning host.
pub struct RusshConnector {
    address: String,
    username: String,
    verifier: Arc<dyn HostKeyVerifier>,
}

impl RusshConnector {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        verifier: Arc<dyn HostKeyVerifier>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            verifier,
        }
    }
}

#[async_trait]
impl SessionConnector for RusshConnector {
    async fn connect(
        &self,
        registry: &mut IdentityRegistry,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        let (host, port) = parse_address(&self.address).map_err(SessionError::Connect)?;
        let key = registry.identity()?;

        let config = build_client_config(None);
        let handler = SshClientHandler::new(host.clone(), self.verifier.clone());
        let connect_future = client::connect(config, (host.as_str(), port), handler);

        let mut handle = tokio::time::timeout(timeout, connect_future)
            .await
            .map_err(|_| SessionError::ConnectTimeout(timeout))?
            .map_err(|e| match e {
                russh::Error::UnknownKey => SessionError::HostKeyRejected {
                    host: host.clone(),
                    fingerprint: "not trusted".to_string(),
                },
                other => SessionError::Connect(other.to_string()),
            })?;

        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(key, hash_alg);
        let result = handle
            .authenticate_publickey(&self.username, key_with_hash)
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;

        if !result.success() {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await;
            return Err(SessionError::Authentication(self.username.clone()));
        }

        let info = SessionInfo::new(host, port, self.username.clone());
        info!(
            "Opened session {} to {}@{}:{}",
            info.session_id, info.username, info.host, info.port
        );
        Ok(Box::new(RusshSession { info, handle }))
    }
}

/// Session backed by a russh client handle.
pub struct RusshSession {
    info: SessionInfo,
    handle: client::Handle<SshClientHandler>,
}

#[async_trait]
impl RemoteSession for RusshSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn is_connected(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn open_exec(&self) -> Result<Box<dyn ExecChannel>, SessionError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Channel(format!("Failed to open channel: {}", e)))?;
        Ok(Box::new(RusshChannel { channel }))
    }

    async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            warn!(
                "Error while disconnecting session {}: {}",
                self.info.session_id, e
            );
        }
    }
}

/// Exec channel backed by a russh session channel.
pub struct RusshChannel {
    channel: russh::Channel<client::Msg>,
}

#[async_trait]
impl ExecChannel for RusshChannel {
    async fn exec(&mut self, command: &str) -> Result<(), SessionError> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| SessionError::Channel(format!("Failed to execute command: {}", e)))
    }

    async fn send_stdin(
        &mut self,
        input: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<(), SessionError> {
        self.channel
            .data(input)
            .await
            .map_err(|e| SessionError::Channel(format!("Failed to send input: {}", e)))?;
        self.channel
            .eof()
            .await
            .map_err(|e| SessionError::Channel(format!("Failed to close input: {}", e)))
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.channel.wait().await? {
                ChannelMsg::Data { data } => ChannelEvent::Stdout(data.to_vec()),
                // ext == 1 is stderr in SSH protocol
                ChannelMsg::ExtendedData { data, ext: 1 } => ChannelEvent::Stderr(data.to_vec()),
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::Close => ChannelEvent::Closed,
                // Ignore other message types
                _ => continue,
            };
            return Some(event);
        }
    }

    async fn close(&mut self) {
        let _ = self.channel.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod address_parsing {
        use super::*;

        #[test]
        fn test_hostname_with_port() {
            let (host, port) = parse_address("scanner.example.com:2222").unwrap();
            assert_eq!(host, "scanner.example.com");
            assert_eq!(port, 2222);
        }

        #[test]
        fn test_host_without_port_defaults_to_22() {
            let (host, port) = parse_address("192.168.1.1").unwrap();
            assert_eq!(host, "192.168.1.1");
            assert_eq!(port, 22);
        }

        #[test]
        fn test_invalid_port_returns_error() {
            let result = parse_address("scanner:invalid");
            assert!(result.unwrap_err().contains("Invalid port number"));
        }

        #[test]
        fn test_port_out_of_range() {
            assert!(parse_address("scanner:99999").is_err());
        }

        #[test]
        fn test_ipv6_with_port() {
            let (host, port) = parse_address("[::1]:22").unwrap();
            assert_eq!(host, "[::1]");
            assert_eq!(port, 22);
        }
    }

    mod client_config {
        use super::*;

        #[test]
        fn test_pooled_sessions_have_no_inactivity_timeout() {
            let config = build_client_config(None);
            assert_eq!(config.inactivity_timeout, None);
        }

        #[test]
        fn test_builds_config_with_keepalive() {
            let config = build_client_config(Some(Duration::from_secs(45)));
            assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(45)));
            assert_eq!(config.keepalive_interval, Some(Duration::from_secs(30)));
            assert_eq!(config.keepalive_max, 3);
        }
    }

    mod connector {
        use super::*;
        use crate::fossology::credentials::CredentialStore;
        use crate::fossology::hostkey::{MemoryFingerprintRepository, RepositoryHostKeyVerifier};

        #[tokio::test]
        async fn test_connect_fails_on_bad_address_before_loading_key() {
            let verifier = Arc::new(RepositoryHostKeyVerifier::new(
                MemoryFingerprintRepository::new(),
            ));
            let connector = RusshConnector::new("scanner:notaport", "sw360", verifier);
            let store = CredentialStore::new("/nonexistent/id_rsa", None);
            let mut registry = store.lock().await;

            let result = connector
                .connect(&mut registry, Duration::from_secs(1))
                .await;
            assert!(matches!(result, Err(SessionError::Connect(_))));
        }

        #[tokio::test]
        async fn test_connect_reports_missing_key() {
            let verifier = Arc::new(RepositoryHostKeyVerifier::new(
                MemoryFingerprintRepository::new(),
            ));
            let connector = RusshConnector::new("127.0.0.1:1", "sw360", verifier);
            let store = CredentialStore::new("/nonexistent/id_rsa", None);
            let mut registry = store.lock().await;

            let result = connector
                .connect(&mut registry, Duration::from_secs(1))
                .await;
            assert!(matches!(result, Err(SessionError::Credentials { .. })));
        }
    }
}
