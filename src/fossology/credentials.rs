//! Private key registry shared by every session of a pool.
//!
//! The registry sits behind a single async mutex. Holding the guard is what
//! serializes cold session creation in [`crate::fossology::pool::SessionPool`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::fossology::error::SessionError;

/// Identity used to authenticate against the scanning host.
pub struct IdentityRegistry {
    key_path: PathBuf,
    passphrase: Option<String>,
    identity: Option<Arc<keys::PrivateKey>>,
}

impl IdentityRegistry {
    /// Private key of the registered identity, loaded on first use.
    pub fn identity(&mut self) -> Result<Arc<keys::PrivateKey>, SessionError> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }

        let key = keys::load_secret_key(&self.key_path, self.passphrase.as_deref()).map_err(
            |e| SessionError::Credentials {
                path: self.key_path.display().to_string(),
                reason: e.to_string(),
            },
        )?;
        debug!("Loaded private key from {:?}", self.key_path);

        let key = Arc::new(key);
        self.identity = Some(key.clone());
        Ok(key)
    }

    pub fn is_loaded(&self) -> bool {
        self.identity.is_some()
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

/// Mutex-guarded [`IdentityRegistry`].
pub struct CredentialStore {
    registry: Mutex<IdentityRegistry>,
}

impl CredentialStore {
    pub fn new(key_path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            registry: Mutex::new(IdentityRegistry {
                key_path: key_path.into(),
                passphrase,
                identity: None,
            }),
        }
    }

    /// Load the private key now instead of on the first connection.
    pub async fn preload(&self) -> Result<(), SessionError> {
        self.registry.lock().await.identity().map(|_| ())
    }

    pub async fn lock(&self) -> MutexGuard<'_, IdentityRegistry> {
        self.registry.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_file_is_credential_error() {
        let store = CredentialStore::new("/nonexistent/fossology/id_rsa", None);
        let err = store.preload().await.unwrap_err();
        assert!(matches!(err, SessionError::Credentials { .. }));
        assert!(!err.is_retryable());
        assert!(!store.lock().await.is_loaded());
    }

    #[tokio::test]
    async fn test_registry_exposes_key_path() {
        let store = CredentialStore::new("/keys/id_ed25519", None);
        assert_eq!(
            store.lock().await.key_path(),
            Path::new("/keys/id_ed25519")
        );
    }
}
