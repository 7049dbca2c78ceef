//! SSH transport: protocol commands run through the [`CommandExecutor`].

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tracing::{error, info, warn};

use crate::fossology::error::ExecError;
use crate::fossology::executor::CommandExecutor;
use crate::fossology::protocol::{
    build_copy_command, build_duplicate_command, build_status_command, build_upload_command,
    is_valid_team, parse_status_result, parse_upload_result,
};
use crate::fossology::types::ExternalStatus;

pub struct SshUploader {
    executor: Arc<CommandExecutor>,
    execution_timeout: Duration,
}

impl SshUploader {
    pub fn new(executor: Arc<CommandExecutor>, execution_timeout: Duration) -> Self {
        Self {
            executor,
            execution_timeout,
        }
    }

    pub fn executor(&self) -> &Arc<CommandExecutor> {
        &self.executor
    }

    /// Upload `content` for `team`; the scanning host answers with the new upload id.
    pub async fn upload(
        &self,
        content: &mut (dyn AsyncRead + Unpin + Send),
        attachment_id: &str,
        team: &str,
        filename: &str,
    ) -> Result<Option<u32>, ExecError> {
        if !is_valid_team(team) {
            error!("Refusing upload of {} for invalid team '{}'", filename, team);
            return Ok(None);
        }

        let command = build_upload_command(attachment_id, team, filename);
        let mut output = Vec::new();
        let exit_code = self
            .executor
            .run(
                &command,
                Some(content),
                Some(&mut output),
                self.execution_timeout,
            )
            .await?;

        let output = String::from_utf8_lossy(&output);
        if exit_code != 0 {
            error!(
                "Upload of {} failed with exit code {}: {}",
                filename, exit_code, output
            );
            return Ok(None);
        }

        match parse_upload_result(&output) {
            Ok(upload_id) => {
                info!("Uploaded {} as upload {}", filename, upload_id);
                Ok(Some(upload_id))
            }
            Err(_) => Ok(None),
        }
    }

    /// Status of `upload_id` as seen by `team`.
    pub async fn status(&self, upload_id: u32, team: &str) -> Result<ExternalStatus, ExecError> {
        if !is_valid_team(team) {
            error!("Refusing status query for invalid team '{}'", team);
            return Ok(ExternalStatus::Error);
        }

        let command = build_status_command(upload_id, team);
        let mut output = Vec::new();
        let exit_code = self
            .executor
            .run(&command, None, Some(&mut output), self.execution_timeout)
            .await?;

        let output = String::from_utf8_lossy(&output);
        if exit_code != 0 {
            warn!(
                "Status query for upload {} and team {} exited with {}: {}",
                upload_id, team, exit_code, output
            );
            return Ok(ExternalStatus::ConnectionFailed);
        }

        Ok(parse_status_result(&output))
    }

    /// Make `upload_id` visible to `team`.
    pub async fn duplicate(&self, upload_id: u32, team: &str) -> Result<bool, ExecError> {
        if !is_valid_team(team) {
            error!("Refusing duplicate for invalid team '{}'", team);
            return Ok(false);
        }

        let command = build_duplicate_command(upload_id, team);
        let exit_code = self
            .executor
            .run(&command, None, None, self.execution_timeout)
            .await?;
        if exit_code != 0 {
            warn!(
                "Duplicating upload {} for team {} exited with {}",
                upload_id, team, exit_code
            );
        }
        Ok(exit_code == 0)
    }

    /// Copy `content` to `filename` on the scanning host.
    pub async fn copy_to_host(
        &self,
        filename: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
        executable: bool,
    ) -> Result<bool, ExecError> {
        let command = build_copy_command(filename, executable);
        let exit_code = self
            .executor
            .run(&command, Some(content), None, self.execution_timeout)
            .await?;
        if exit_code != 0 {
            error!("Copying {} to the scanning host exited with {}", filename, exit_code);
        }
        Ok(exit_code == 0)
    }
}
