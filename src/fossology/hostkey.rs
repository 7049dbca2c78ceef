//! Host key verification against a repository of known fingerprints.
//!
//! A fingerprint seen for the first time is recorded as untrusted and the
//! connection is refused; an operator has to mark it trusted before sessions
//! to that host succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fossology::error::StoreError;

/// Fingerprint record kept by the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFingerprint {
    pub fingerprint: String,
    pub host: String,
    pub trusted: bool,
    pub first_seen: DateTime<Utc>,
}

/// Outcome of a host key check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyVerdict {
    /// Fingerprint is known and trusted.
    Trusted,
    /// Fingerprint is known but has not been trusted.
    NotTrusted,
    /// Fingerprint is empty or was not known before this check.
    NotIncluded,
}

/// Storage for known host key fingerprints.
#[async_trait]
pub trait FingerprintRepository: Send + Sync {
    async fn find(&self, fingerprint: &str) -> Result<Option<KnownFingerprint>, StoreError>;

    async fn add(&self, fingerprint: KnownFingerprint) -> Result<(), StoreError>;
}

/// Decides whether a server's host key is acceptable.
#[async_trait]
pub trait HostKeyVerifier: Send + Sync {
    async fn verify(&self, host: &str, fingerprint: &str) -> HostKeyVerdict;
}

/// Verifier backed by a [`FingerprintRepository`].
pub struct RepositoryHostKeyVerifier<R> {
    repository: R,
}

impl<R: FingerprintRepository> RepositoryHostKeyVerifier<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }
}

#[async_trait]
impl<R: FingerprintRepository> HostKeyVerifier for RepositoryHostKeyVerifier<R> {
    async fn verify(&self, host: &str, fingerprint: &str) -> HostKeyVerdict {
        let fingerprint = fingerprint.trim();
        if fingerprint.is_empty() {
            warn!("Empty host key fingerprint presented by {}", host);
            return HostKeyVerdict::NotIncluded;
        }

        match self.repository.find(fingerprint).await {
            Ok(Some(known)) if known.trusted => HostKeyVerdict::Trusted,
            Ok(Some(_)) => {
                warn!(
                    "Host key {} of {} is known but not trusted",
                    fingerprint, host
                );
                HostKeyVerdict::NotTrusted
            }
            Ok(None) => {
                info!(
                    "Recording new host key {} of {} as untrusted",
                    fingerprint, host
                );
                let record = KnownFingerprint {
                    fingerprint: fingerprint.to_string(),
                    host: host.to_string(),
                    trusted: false,
                    first_seen: Utc::now(),
                };
                if let Err(e) = self.repository.add(record).await {
                    warn!("Failed to record host key {}: {}", fingerprint, e);
                }
                HostKeyVerdict::NotIncluded
            }
            Err(e) => {
                warn!("Host key lookup for {} failed: {}", host, e);
                HostKeyVerdict::NotIncluded
            }
        }
    }
}

/// In-memory fingerprint repository.
#[derive(Default)]
pub struct MemoryFingerprintRepository {
    fingerprints: DashMap<String, KnownFingerprint>,
}

impl MemoryFingerprintRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-seeded with trusted fingerprints for `host`.
    pub fn with_trusted<I, S>(host: &str, fingerprints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let repository = Self::new();
        for fingerprint in fingerprints {
            let fingerprint = fingerprint.into();
            repository.fingerprints.insert(
                fingerprint.clone(),
                KnownFingerprint {
                    fingerprint,
                    host: host.to_string(),
                    trusted: true,
                    first_seen: Utc::now(),
                },
            );
        }
        repository
    }

    /// Mark a recorded fingerprint as trusted. Returns `false` if it is unknown.
    pub fn trust(&self, fingerprint: &str) -> bool {
        match self.fingerprints.get_mut(fingerprint) {
            Some(mut entry) => {
                entry.trusted = true;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

#[async_trait]
impl FingerprintRepository for MemoryFingerprintRepository {
    async fn find(&self, fingerprint: &str) -> Result<Option<KnownFingerprint>, StoreError> {
        Ok(self.fingerprints.get(fingerprint).map(|e| e.clone()))
    }

    async fn add(&self, fingerprint: KnownFingerprint) -> Result<(), StoreError> {
        self.fingerprints
            .insert(fingerprint.fingerprint.clone(), fingerprint);
        Ok(())
    }
}
