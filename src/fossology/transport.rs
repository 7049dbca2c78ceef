//! Transport abstraction consumed by the upload orchestrator.
//!
//! Connectivity and protocol failures are absorbed by the implementations and
//! surface as `None`, `false` or a sentinel status. Only a timeout escapes as
//! an error.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::fossology::error::ExecError;
use crate::fossology::types::ExternalStatus;
use crate::fossology::uploader::SshUploader;

#[cfg(feature = "rest")]
use crate::fossology::protocol::is_valid_team;
#[cfg(feature = "rest")]
use crate::fossology::rest::RestClient;
#[cfg(feature = "rest")]
use crate::fossology::types::ScanStatus;
#[cfg(feature = "rest")]
use tracing::{error, warn};

#[async_trait]
pub trait ScanTransport: Send + Sync {
    /// Start a new upload; returns the upload id.
    async fn upload(
        &self,
        attachment_id: &str,
        team: &str,
        filename: &str,
        content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<Option<u32>, ExecError>;

    /// Status of `upload_id` as seen by `team`.
    async fn status(&self, upload_id: u32, team: &str) -> Result<ExternalStatus, ExecError>;

    /// Make `upload_id` visible to `team`.
    async fn duplicate(&self, upload_id: u32, team: &str) -> Result<bool, ExecError>;
}

#[async_trait]
impl ScanTransport for SshUploader {
    async fn upload(
        &self,
        attachment_id: &str,
        team: &str,
        filename: &str,
        mut content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<Option<u32>, ExecError> {
        SshUploader::upload(self, &mut *content, attachment_id, team, filename).await
    }

    async fn status(&self, upload_id: u32, team: &str) -> Result<ExternalStatus, ExecError> {
        SshUploader::status(self, upload_id, team).await
    }

    async fn duplicate(&self, upload_id: u32, team: &str) -> Result<bool, ExecError> {
        SshUploader::duplicate(self, upload_id, team).await
    }
}

/// REST-backed transport.
///
/// Uploads land in the shared configured folder, so every team already sees
/// them and duplication has nothing to do. The status of an upload follows
/// its unpack job: running means scanning, completed means open.
#[cfg(feature = "rest")]
pub struct RestScanTransport {
    client: RestClient,
}

#[cfg(feature = "rest")]
impl RestScanTransport {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RestClient {
        &self.client
    }
}

#[cfg(feature = "rest")]
#[async_trait]
impl ScanTransport for RestScanTransport {
    async fn upload(
        &self,
        attachment_id: &str,
        team: &str,
        filename: &str,
        content: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<Option<u32>, ExecError> {
        if !is_valid_team(team) {
            error!("Refusing upload of {} for invalid team '{}'", filename, team);
            return Ok(None);
        }

        let description = format!("Attachment {} for {}", attachment_id, team);
        let Some(upload_id) = self
            .client
            .upload_file(filename, content, Some(&description))
            .await
        else {
            return Ok(None);
        };

        if self.client.start_scanning(upload_id).await.is_none() {
            warn!("Upload {} created but its scan job did not start", upload_id);
        }
        Ok(Some(upload_id))
    }

    async fn status(&self, upload_id: u32, team: &str) -> Result<ExternalStatus, ExecError> {
        if !is_valid_team(team) {
            error!("Refusing status query for invalid team '{}'", team);
            return Ok(ExternalStatus::Error);
        }

        let status = match self.client.check_unpack_status(upload_id).await {
            Some(ScanStatus::Running) => ExternalStatus::Scanning,
            Some(ScanStatus::Completed) => ExternalStatus::Open,
            Some(ScanStatus::Failed) => ExternalStatus::Error,
            None => ExternalStatus::ConnectionFailed,
        };
        Ok(status)
    }

    async fn duplicate(&self, _upload_id: u32, team: &str) -> Result<bool, ExecError> {
        Ok(is_valid_team(team))
    }
}
