//! Release, upload and status model.
//!
//! [`ExternalStatus`] carries an explicit severity table declared once in
//! [`ExternalStatus::severity`]; every comparison between statuses goes through
//! it. [`ClearingState`] is ordered by declaration.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Team name the record keeping system assigns when no clearing team is known.
pub const UNKNOWN_TEAM: &str = "Unknown";

/// Status of a release upload as seen by one requesting team on the scanning server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalStatus {
    NotSent,
    ConnectionFailed,
    Error,
    NonExistent,
    Inaccessible,
    Rejected,
    Sent,
    Scanning,
    Open,
    InProgress,
    Closed,
    ReportAvailable,
}

impl ExternalStatus {
    /// Position of the status in the total order.
    pub const fn severity(self) -> u8 {
        match self {
            ExternalStatus::NotSent => 0,
            ExternalStatus::ConnectionFailed => 10,
            ExternalStatus::Error => 20,
            ExternalStatus::NonExistent => 30,
            ExternalStatus::Inaccessible => 40,
            ExternalStatus::Rejected => 50,
            ExternalStatus::Sent => 60,
            ExternalStatus::Scanning => 70,
            ExternalStatus::Open => 80,
            ExternalStatus::InProgress => 90,
            ExternalStatus::Closed => 100,
            ExternalStatus::ReportAvailable => 110,
        }
    }

    /// Map the integer code printed by the remote status script.
    ///
    /// Unknown codes map to [`ExternalStatus::Error`].
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ExternalStatus::ConnectionFailed,
            1 => ExternalStatus::Error,
            2 => ExternalStatus::NonExistent,
            3 => ExternalStatus::NotSent,
            4 => ExternalStatus::Inaccessible,
            10 => ExternalStatus::Sent,
            11 => ExternalStatus::Scanning,
            20 => ExternalStatus::Open,
            21 => ExternalStatus::InProgress,
            22 => ExternalStatus::Closed,
            23 => ExternalStatus::Rejected,
            30 => ExternalStatus::ReportAvailable,
            _ => ExternalStatus::Error,
        }
    }

    /// Sentinel statuses produced when the scanning server could not be asked.
    pub fn is_error(self) -> bool {
        matches!(self, ExternalStatus::ConnectionFailed | ExternalStatus::Error)
    }

    /// Whether the upload is visible to the team on the scanning server.
    pub fn is_visible(self) -> bool {
        self >= ExternalStatus::Sent
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExternalStatus::NotSent => "NOT_SENT",
            ExternalStatus::ConnectionFailed => "CONNECTION_FAILED",
            ExternalStatus::Error => "ERROR",
            ExternalStatus::NonExistent => "NON_EXISTENT",
            ExternalStatus::Inaccessible => "INACCESSIBLE",
            ExternalStatus::Rejected => "REJECTED",
            ExternalStatus::Sent => "SENT",
            ExternalStatus::Scanning => "SCANNING",
            ExternalStatus::Open => "OPEN",
            ExternalStatus::InProgress => "IN_PROGRESS",
            ExternalStatus::Closed => "CLOSED",
            ExternalStatus::ReportAvailable => "REPORT_AVAILABLE",
        }
    }
}

impl PartialOrd for ExternalStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExternalStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl fmt::Display for ExternalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExternalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "NOT_SENT" => ExternalStatus::NotSent,
            "CONNECTION_FAILED" => ExternalStatus::ConnectionFailed,
            "ERROR" => ExternalStatus::Error,
            "NON_EXISTENT" => ExternalStatus::NonExistent,
            "INACCESSIBLE" => ExternalStatus::Inaccessible,
            "REJECTED" => ExternalStatus::Rejected,
            "SENT" => ExternalStatus::Sent,
            "SCANNING" => ExternalStatus::Scanning,
            "OPEN" => ExternalStatus::Open,
            "IN_PROGRESS" => ExternalStatus::InProgress,
            "CLOSED" => ExternalStatus::Closed,
            "REPORT_AVAILABLE" => ExternalStatus::ReportAvailable,
            other => return Err(format!("Unknown status name: {}", other)),
        };
        Ok(status)
    }
}

/// Locally tracked clearing progress of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClearingState {
    #[default]
    NewClearing,
    SentToScanning,
    UnderClearing,
    ReportAvailable,
    Approved,
}

impl ClearingState {
    /// Clearing state implied by the highest external status of a release.
    ///
    /// Returns `None` when the status does not move the clearing state.
    pub fn derived_from(status: ExternalStatus) -> Option<Self> {
        if status == ExternalStatus::InProgress {
            Some(ClearingState::UnderClearing)
        } else if status >= ExternalStatus::Sent && status < ExternalStatus::InProgress {
            Some(ClearingState::SentToScanning)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentKind {
    Source,
    SourceSelf,
    Binary,
    Document,
    Other,
}

impl AttachmentKind {
    pub fn is_source(self) -> bool {
        matches!(self, AttachmentKind::Source | AttachmentKind::SourceSelf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub kind: AttachmentKind,
}

/// Link between a release and the upload created for it on the scanning server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUpload {
    pub upload_id: u32,
    pub attachment_id: String,
    pub filename: String,
    pub created_on: DateTime<Utc>,
}

impl RemoteUpload {
    pub fn new(upload_id: u32, attachment: &Attachment) -> Self {
        Self {
            upload_id,
            attachment_id: attachment.id.clone(),
            filename: attachment.filename.clone(),
            created_on: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Scan,
    Report,
}

/// Job submitted through the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJob {
    pub job_id: u32,
    pub kind: JobKind,
}

/// Progress of a REST job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Completed,
    Running,
    Failed,
}

impl ScanStatus {
    /// Status names used by the job endpoints.
    pub fn from_job_status(status: &str) -> Self {
        match status {
            "Completed" => ScanStatus::Completed,
            "Queued" | "Processing" => ScanStatus::Running,
            _ => ScanStatus::Failed,
        }
    }

    /// Integer form: 1 completed, 0 running, -1 failed.
    pub fn code(self) -> i32 {
        match self {
            ScanStatus::Completed => 1,
            ScanStatus::Running => 0,
            ScanStatus::Failed => -1,
        }
    }
}

/// Release record as far as the bridge is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<RemoteUpload>,
    #[serde(default)]
    pub team_status: BTreeMap<String, ExternalStatus>,
    #[serde(default)]
    pub clearing_state: ClearingState,
}

impl Release {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            attachments: Vec::new(),
            upload: None,
            team_status: BTreeMap::new(),
            clearing_state: ClearingState::default(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn source_attachments(&self) -> Vec<&Attachment> {
        self.attachments
            .iter()
            .filter(|a| a.kind.is_source())
            .collect()
    }

    /// True when at least one team is recorded and every team rejected the upload.
    pub fn all_rejected(&self) -> bool {
        !self.team_status.is_empty()
            && self
                .team_status
                .values()
                .all(|s| *s == ExternalStatus::Rejected)
    }

    pub fn max_status(&self) -> Option<ExternalStatus> {
        self.team_status.values().copied().max()
    }

    /// Move the clearing state forward to what the highest team status implies.
    ///
    /// Returns `true` when the state changed.
    pub fn advance_clearing_state(&mut self) -> bool {
        match self.max_status().and_then(ClearingState::derived_from) {
            Some(derived) if derived > self.clearing_state => {
                self.clearing_state = derived;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str) -> Attachment {
        Attachment {
            id: id.to_string(),
            filename: format!("{}.tar.gz", id),
            kind: AttachmentKind::Source,
        }
    }

    mod external_status {
        use super::*;

        #[test]
        fn test_total_order_follows_severity_table() {
            let ordered = [
                ExternalStatus::NotSent,
                ExternalStatus::ConnectionFailed,
                ExternalStatus::Error,
                ExternalStatus::NonExistent,
                ExternalStatus::Inaccessible,
                ExternalStatus::Rejected,
                ExternalStatus::Sent,
                ExternalStatus::Scanning,
                ExternalStatus::Open,
                ExternalStatus::InProgress,
                ExternalStatus::Closed,
                ExternalStatus::ReportAvailable,
            ];
            for pair in ordered.windows(2) {
                assert!(pair[0] < pair[1], "{} < {}", pair[0], pair[1]);
            }
        }

        #[test]
        fn test_from_code_known_values() {
            assert_eq!(ExternalStatus::from_code(0), ExternalStatus::ConnectionFailed);
            assert_eq!(ExternalStatus::from_code(4), ExternalStatus::Inaccessible);
            assert_eq!(ExternalStatus::from_code(10), ExternalStatus::Sent);
            assert_eq!(ExternalStatus::from_code(21), ExternalStatus::InProgress);
            assert_eq!(ExternalStatus::from_code(23), ExternalStatus::Rejected);
            assert_eq!(ExternalStatus::from_code(30), ExternalStatus::ReportAvailable);
        }

        #[test]
        fn test_from_code_unknown_is_error() {
            assert_eq!(ExternalStatus::from_code(5), ExternalStatus::Error);
            assert_eq!(ExternalStatus::from_code(-1), ExternalStatus::Error);
        }

        #[test]
        fn test_name_round_trip() {
            for code in [0, 1, 2, 3, 4, 10, 11, 20, 21, 22, 23, 30] {
                let status = ExternalStatus::from_code(code);
                assert_eq!(status.as_str().parse::<ExternalStatus>(), Ok(status));
            }
            assert!("sent".parse::<ExternalStatus>().is_err());
        }

        #[test]
        fn test_error_and_visibility() {
            assert!(ExternalStatus::ConnectionFailed.is_error());
            assert!(ExternalStatus::Error.is_error());
            assert!(!ExternalStatus::Rejected.is_error());
            assert!(!ExternalStatus::Inaccessible.is_visible());
            assert!(ExternalStatus::Sent.is_visible());
            assert!(ExternalStatus::Closed.is_visible());
        }

        #[test]
        fn test_serde_uses_screaming_snake_case() {
            let json = serde_json::to_string(&ExternalStatus::InProgress).unwrap();
            assert_eq!(json, "\"IN_PROGRESS\"");
        }
    }

    mod clearing_state {
        use super::*;

        #[test]
        fn test_derived_from_mapping() {
            assert_eq!(
                ClearingState::derived_from(ExternalStatus::InProgress),
                Some(ClearingState::UnderClearing)
            );
            assert_eq!(
                ClearingState::derived_from(ExternalStatus::Sent),
                Some(ClearingState::SentToScanning)
            );
            assert_eq!(
                ClearingState::derived_from(ExternalStatus::Open),
                Some(ClearingState::SentToScanning)
            );
            assert_eq!(ClearingState::derived_from(ExternalStatus::Rejected), None);
            assert_eq!(ClearingState::derived_from(ExternalStatus::Closed), None);
        }

        #[test]
        fn test_advance_never_regresses() {
            let mut release = Release::new("r1", "zlib", "1.3");
            release
                .team_status
                .insert("A".to_string(), ExternalStatus::InProgress);
            assert!(release.advance_clearing_state());
            assert_eq!(release.clearing_state, ClearingState::UnderClearing);

            release.team_status.insert("A".to_string(), ExternalStatus::Sent);
            assert!(!release.advance_clearing_state());
            assert_eq!(release.clearing_state, ClearingState::UnderClearing);
        }

        #[test]
        fn test_advance_keeps_later_manual_state() {
            let mut release = Release::new("r1", "zlib", "1.3");
            release.clearing_state = ClearingState::Approved;
            release.team_status.insert("A".to_string(), ExternalStatus::Sent);
            assert!(!release.advance_clearing_state());
            assert_eq!(release.clearing_state, ClearingState::Approved);
        }
    }

    mod release {
        use super::*;

        #[test]
        fn test_all_rejected_requires_entries() {
            let mut release = Release::new("r1", "zlib", "1.3");
            assert!(!release.all_rejected());

            release.team_status.insert("A".to_string(), ExternalStatus::Rejected);
            release.team_status.insert("B".to_string(), ExternalStatus::Rejected);
            assert!(release.all_rejected());

            release.team_status.insert("C".to_string(), ExternalStatus::Sent);
            assert!(!release.all_rejected());
        }

        #[test]
        fn test_source_attachments_filters_kind() {
            let release = Release::new("r1", "zlib", "1.3")
                .with_attachment(source("src"))
                .with_attachment(Attachment {
                    id: "bin".to_string(),
                    filename: "zlib.so".to_string(),
                    kind: AttachmentKind::Binary,
                });
            let sources = release.source_attachments();
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].id, "src");
        }

        #[test]
        fn test_remote_upload_copies_attachment() {
            let upload = RemoteUpload::new(42, &source("src"));
            assert_eq!(upload.upload_id, 42);
            assert_eq!(upload.attachment_id, "src");
            assert_eq!(upload.filename, "src.tar.gz");
        }
    }

    mod scan_status {
        use super::*;

        #[test]
        fn test_job_status_names() {
            assert_eq!(ScanStatus::from_job_status("Queued"), ScanStatus::Running);
            assert_eq!(ScanStatus::from_job_status("Processing"), ScanStatus::Running);
            assert_eq!(ScanStatus::from_job_status("Completed"), ScanStatus::Completed);
            assert_eq!(ScanStatus::from_job_status("Failed"), ScanStatus::Failed);
            assert_eq!(ScanStatus::from_job_status("Whatever"), ScanStatus::Failed);
        }

        #[test]
        fn test_codes() {
            assert_eq!(ScanStatus::Completed.code(), 1);
            assert_eq!(ScanStatus::Running.code(), 0);
            assert_eq!(ScanStatus::Failed.code(), -1);
        }
    }
}
