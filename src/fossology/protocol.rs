//! Remote command templates and output parsing.
//!
//! The scanning host exposes a handful of scripts in the login directory of
//! the bridge user. Every free-text argument is sanitized by replacing `'`
//! with `_` before being placed inside single quotes, so no argument can end
//! its quoting early. The scripts answer with `key=value` tokens on stdout;
//! only the first token of a kind counts.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, warn};

use crate::fossology::error::ParseError;
use crate::fossology::types::{ExternalStatus, UNKNOWN_TEAM};

static UPLOAD_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"uploadId=(\d+)").expect("valid upload id pattern"));

static STATUS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"status=(\w+)").expect("valid status pattern"));

/// Replace every single quote with an underscore.
pub fn sanitize(argument: &str) -> String {
    argument.replace('\'', "_")
}

/// A clearing team must be named and must not be the placeholder team.
pub fn is_valid_team(team: &str) -> bool {
    let team = team.trim();
    !team.is_empty() && team != UNKNOWN_TEAM
}

pub fn build_upload_command(attachment_id: &str, team: &str, filename: &str) -> String {
    format!(
        "./uploadFromSW360 -i '{}' -g '{}' -f '{}'",
        sanitize(attachment_id),
        sanitize(team),
        sanitize(filename)
    )
}

pub fn build_status_command(upload_id: u32, team: &str) -> String {
    format!("./getStatusOfUpload -u '{}' -g '{}'", upload_id, sanitize(team))
}

pub fn build_duplicate_command(upload_id: u32, team: &str) -> String {
    format!("./duplicateUpload -u '{}' -g '{}'", upload_id, sanitize(team))
}

/// Write stdin to `filename`, optionally making it executable for the owner.
pub fn build_copy_command(filename: &str, executable: bool) -> String {
    let filename = sanitize(filename);
    let copy = format!("cat > '{}'", filename);
    if executable {
        format!("{} && chmod u+x '{}'", copy, filename)
    } else {
        copy
    }
}

/// Extract the upload id printed by the upload script.
pub fn parse_upload_result(output: &str) -> Result<u32, ParseError> {
    let Some(captures) = UPLOAD_ID_PATTERN.captures(output) else {
        error!("No upload id in upload script output: {:?}", output);
        return Err(ParseError::MissingToken {
            key: "uploadId",
            output: output.to_string(),
        });
    };

    let value = &captures[1];
    value.parse::<u32>().map_err(|_| {
        error!("Upload id {} is out of range in output: {:?}", value, output);
        ParseError::InvalidValue {
            key: "uploadId",
            value: value.to_string(),
        }
    })
}

/// Extract the status printed by the status script.
///
/// Numeric codes and status names are both accepted. Output without a status
/// token maps to [`ExternalStatus::ConnectionFailed`].
pub fn parse_status_result(output: &str) -> ExternalStatus {
    let Some(captures) = STATUS_PATTERN.captures(output) else {
        error!("No status in status script output: {:?}", output);
        return ExternalStatus::ConnectionFailed;
    };

    let value = &captures[1];
    if let Ok(code) = value.parse::<i64>() {
        return ExternalStatus::from_code(code);
    }
    match value.parse::<ExternalStatus>() {
        Ok(status) => status,
        Err(e) => {
            warn!("{} in status script output: {:?}", e, output);
            ExternalStatus::ConnectionFailed
        }
    }
}
