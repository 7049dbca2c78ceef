//! Wire types of the FOSSology v2 REST API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generic answer of the upload, job and report endpoints.
///
/// `message` carries the created id: a bare number for uploads and jobs, a
/// URL ending in the id for report generation. Older servers send numbers as
/// strings, so the raw JSON value is kept.
#[derive(Debug, Clone, Deserialize)]
pub struct FossologyResponse {
    pub code: u16,
    #[serde(default)]
    pub message: Value,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl FossologyResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn message_text(&self) -> String {
        match &self.message {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Message as a numeric id.
    pub fn message_id(&self) -> Option<u32> {
        self.message_text().trim().parse().ok()
    }

    /// Last path segment of a URL-shaped message as a numeric id.
    pub fn trailing_id(&self) -> Option<u32> {
        let text = self.message_text();
        text.rsplit('/').next()?.trim().parse().ok()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub bucket: bool,
    pub copyright_email_author: bool,
    pub ecc: bool,
    pub keyword: bool,
    pub mime: bool,
    pub monk: bool,
    pub nomos: bool,
    pub ojo: bool,
    pub package: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Decider {
    pub nomos_monk: bool,
    pub bulk_reused: bool,
    pub new_scanner: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reuse {
    pub reuse_upload: u32,
    pub reuse_group: u32,
    pub reuse_main: bool,
    pub reuse_enhanced: bool,
}

/// Body of `POST jobs`. The scanner selection is fixed.
#[derive(Debug, Clone, Serialize)]
pub struct ScanJobRequest {
    pub analysis: Analysis,
    pub decider: Decider,
    pub reuse: Reuse,
}

impl Default for ScanJobRequest {
    fn default() -> Self {
        Self {
            analysis: Analysis {
                bucket: true,
                copyright_email_author: true,
                ecc: true,
                keyword: true,
                mime: true,
                monk: true,
                nomos: true,
                ojo: true,
                package: true,
            },
            decider: Decider {
                nomos_monk: true,
                bulk_reused: true,
                new_scanner: true,
            },
            reuse: Reuse {
                reuse_upload: 0,
                reuse_group: 0,
                reuse_main: true,
                reuse_enhanced: true,
            },
        }
    }
}

/// First string value stored under `key` anywhere in `value`, depth first.
pub fn find_text(value: &Value, key: &str) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                return match found {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                };
            }
            map.values().find_map(|v| find_text(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| find_text(v, key)),
        _ => None,
    }
}
