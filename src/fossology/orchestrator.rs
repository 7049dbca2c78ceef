//! Send-to-scanning and status refresh for releases.
//!
//! A release is uploaded to the scanning host at most once. Every further
//! clearing team either already sees that upload, in which case its status is
//! copied in, or gets the upload duplicated into its group. Only when every
//! team rejected the upload is the link dropped and a fresh upload started.
//!
//! A failed send writes nothing back to the store. A refresh that observed an
//! error status returns the updated release but does not persist it.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::fossology::error::OrchestratorError;
use crate::fossology::protocol::is_valid_team;
use crate::fossology::store::{AttachmentSource, ReleaseStore};
use crate::fossology::transport::ScanTransport;
use crate::fossology::types::{Attachment, ExternalStatus, Release, RemoteUpload};

pub struct UploadOrchestrator {
    store: Arc<dyn ReleaseStore>,
    attachments: Arc<dyn AttachmentSource>,
    transport: Arc<dyn ScanTransport>,
}

impl UploadOrchestrator {
    pub fn new(
        store: Arc<dyn ReleaseStore>,
        attachments: Arc<dyn AttachmentSource>,
        transport: Arc<dyn ScanTransport>,
    ) -> Self {
        Self {
            store,
            attachments,
            transport,
        }
    }

    /// Make the release's source attachment scannable for `team`.
    ///
    /// Returns `Ok(false)` when the scanning host could not be reached or
    /// refused the request; the stored release is then left untouched.
    pub async fn send_to_scanning(
        &self,
        release_id: &str,
        team: &str,
    ) -> Result<bool, OrchestratorError> {
        if !is_valid_team(team) {
            return Err(OrchestratorError::InvalidTeam(team.to_string()));
        }
        let mut release = self.load(release_id).await?;

        if release.all_rejected() {
            info!(
                "Every team rejected upload of release {}, starting over",
                release.id
            );
            release.upload = None;
            release.team_status.clear();
        }

        let attachment = sole_source_attachment(&release)?;

        let sent = match release.upload.as_ref().map(|u| u.upload_id) {
            None => self.upload_new(&mut release, &attachment, team).await?,
            Some(upload_id) => self.share_existing(&mut release, upload_id, team).await?,
        };
        if !sent {
            return Ok(false);
        }

        release.advance_clearing_state();
        self.store.save(&release).await?;
        Ok(true)
    }

    /// Query the scanning host for every known team plus `team`.
    pub async fn refresh_status(
        &self,
        release_id: &str,
        team: &str,
    ) -> Result<Release, OrchestratorError> {
        if !is_valid_team(team) {
            return Err(OrchestratorError::InvalidTeam(team.to_string()));
        }
        let mut release = self.load(release_id).await?;

        let Some(upload_id) = release.upload.as_ref().map(|u| u.upload_id) else {
            return Ok(release);
        };

        let mut teams: BTreeSet<String> = release.team_status.keys().cloned().collect();
        teams.insert(team.to_string());

        let queries = teams
            .iter()
            .map(|t| self.transport.status(upload_id, t.as_str()));
        let statuses = join_all(queries).await;

        let mut persist = true;
        for (team, status) in teams.into_iter().zip(statuses) {
            let status = status?;
            if status.is_error() {
                warn!(
                    "Status of upload {} for {} is {}, release {} will not be stored",
                    upload_id, team, status, release.id
                );
                persist = false;
            }
            release.team_status.insert(team, status);
        }

        release.advance_clearing_state();
        if persist {
            self.store.save(&release).await?;
        }
        Ok(release)
    }

    async fn load(&self, release_id: &str) -> Result<Release, OrchestratorError> {
        self.store
            .load(release_id)
            .await?
            .ok_or_else(|| OrchestratorError::ReleaseNotFound(release_id.to_string()))
    }

    async fn upload_new(
        &self,
        release: &mut Release,
        attachment: &Attachment,
        team: &str,
    ) -> Result<bool, OrchestratorError> {
        let content = self.attachments.open(release, attachment).await?;
        let upload_id = self
            .transport
            .upload(&attachment.id, team, &attachment.filename, content)
            .await?;

        let upload_id = match upload_id {
            Some(id) if id > 0 => id,
            _ => {
                error!(
                    "Upload of {} for release {} failed",
                    attachment.filename, release.id
                );
                return Ok(false);
            }
        };

        info!(
            "Release {} uploaded as {} for {}",
            release.id, upload_id, team
        );
        release.upload = Some(RemoteUpload::new(upload_id, attachment));
        release
            .team_status
            .insert(team.to_string(), ExternalStatus::Sent);
        Ok(true)
    }

    async fn share_existing(
        &self,
        release: &mut Release,
        upload_id: u32,
        team: &str,
    ) -> Result<bool, OrchestratorError> {
        let status = self.transport.status(upload_id, team).await?;

        // A rejecting team still sees the upload.
        if status.is_visible() || status == ExternalStatus::Rejected {
            info!(
                "Upload {} is already visible to {} ({})",
                upload_id, team, status
            );
            release.team_status.insert(team.to_string(), status);
            return Ok(true);
        }

        if status != ExternalStatus::Inaccessible {
            error!(
                "Cannot tell whether upload {} of release {} is visible to {}: {}",
                upload_id, release.id, team, status
            );
            return Ok(false);
        }

        if !self.transport.duplicate(upload_id, team).await? {
            error!("Duplicating upload {} for {} failed", upload_id, team);
            return Ok(false);
        }

        info!("Duplicated upload {} for {}", upload_id, team);
        release
            .team_status
            .insert(team.to_string(), ExternalStatus::Sent);
        Ok(true)
    }
}

fn sole_source_attachment(release: &Release) -> Result<Attachment, OrchestratorError> {
    match release.source_attachments().as_slice() {
        [attachment] => Ok((*attachment).clone()),
        sources => {
            error!(
                "Release {} has {} source attachments",
                release.id,
                sources.len()
            );
            Err(OrchestratorError::SourceAttachmentCount {
                release: release.id.clone(),
                count: sources.len(),
            })
        }
    }
}
