//! Bounded pool of authenticated sessions to the scanning host.
//!
//! `acquire` prefers a cached idle session. A cached session that reports
//! disconnected is discarded and a fresh one is opened. Cold creation runs
//! while holding the [`CredentialStore`] lock, so only one session is being
//! opened at any time. `release` caches a session only while it is still
//! connected and the cache has room; otherwise the session is closed.
//!
//! The pool does not retry failed connections.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::fossology::credentials::CredentialStore;
use crate::fossology::error::SessionError;
use crate::fossology::session::{RemoteSession, SessionConnector};
use crate::fossology::storage::{DashMapIdleSessions, IdleSessionStorage};

pub struct SessionPool {
    connector: Arc<dyn SessionConnector>,
    credentials: Arc<CredentialStore>,
    idle: Box<dyn IdleSessionStorage>,
}

impl SessionPool {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        credentials: Arc<CredentialStore>,
        capacity: usize,
    ) -> Self {
        Self::with_storage(
            connector,
            credentials,
            Box::new(DashMapIdleSessions::new(capacity)),
        )
    }

    pub fn with_storage(
        connector: Arc<dyn SessionConnector>,
        credentials: Arc<CredentialStore>,
        idle: Box<dyn IdleSessionStorage>,
    ) -> Self {
        Self {
            connector,
            credentials,
            idle,
        }
    }

    /// Check out a connected session, opening one if none is cached.
    pub async fn acquire(
        &self,
        connect_timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        if let Some(session) = self.idle.pop() {
            if session.is_connected() {
                debug!("Reusing idle session {}", session.info().session_id);
                return Ok(session);
            }
            debug!(
                "Discarding disconnected idle session {}",
                session.info().session_id
            );
            session.disconnect().await;
        }

        let mut registry = self.credentials.lock().await;
        let session = self.connector.connect(&mut registry, connect_timeout).await?;
        drop(registry);

        info!(
            "Opened new session {} to {}",
            session.info().session_id,
            session.info().host
        );
        Ok(session)
    }

    /// Return a session after a successful command.
    pub async fn release(&self, session: Box<dyn RemoteSession>) {
        if !session.is_connected() {
            debug!(
                "Dropping released session {}, no longer connected",
                session.info().session_id
            );
            return;
        }

        if let Err(session) = self.idle.push(session) {
            debug!(
                "Idle cache full ({}), closing session {}",
                self.idle.capacity(),
                session.info().session_id
            );
            session.disconnect().await;
        }
    }

    /// Disconnect every idle session.
    pub async fn shutdown(&self) {
        let sessions = self.idle.drain();
        if !sessions.is_empty() {
            info!("Closing {} idle session(s)", sessions.len());
        }
        for session in sessions {
            session.disconnect().await;
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }
}
