//! Seams to the release store and to attachment content.
//!
//! The bridge does not own release persistence. It reads a release, changes
//! its upload linkage, team status map and clearing state, and hands the
//! record back through [`ReleaseStore::save`]. In-memory implementations
//! backed by DashMap are provided for embedding and tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncRead;

use crate::fossology::error::StoreError;
use crate::fossology::types::{Attachment, Release};

#[async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn load(&self, release_id: &str) -> Result<Option<Release>, StoreError>;

    async fn save(&self, release: &Release) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Open the content of `attachment` for reading.
    async fn open(
        &self,
        release: &Release,
        attachment: &Attachment,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, StoreError>;
}

#[derive(Default)]
pub struct MemoryReleaseStore {
    releases: DashMap<String, Release>,
    saves: AtomicUsize,
}

impl MemoryReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, release: Release) {
        self.releases.insert(release.id.clone(), release);
    }

    pub fn get(&self, release_id: &str) -> Option<Release> {
        self.releases.get(release_id).map(|r| r.value().clone())
    }

    /// Number of successful `save` calls.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseStore for MemoryReleaseStore {
    async fn load(&self, release_id: &str) -> Result<Option<Release>, StoreError> {
        Ok(self.get(release_id))
    }

    async fn save(&self, release: &Release) -> Result<(), StoreError> {
        self.releases.insert(release.id.clone(), release.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Attachment contents keyed by attachment id.
#[derive(Default)]
pub struct MemoryAttachmentSource {
    contents: DashMap<String, Vec<u8>>,
}

impl MemoryAttachmentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, attachment_id: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.contents.insert(attachment_id.into(), content.into());
    }
}

#[async_trait]
impl AttachmentSource for MemoryAttachmentSource {
    async fn open(
        &self,
        _release: &Release,
        attachment: &Attachment,
    ) -> Result<Box<dyn AsyncRead + Send + Unpin>, StoreError> {
        let content = self
            .contents
            .get(&attachment.id)
            .map(|c| c.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("attachment {}", attachment.id)))?;
        Ok(Box::new(std::io::Cursor::new(content)))
    }
}
