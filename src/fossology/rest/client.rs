//! Stateless client for the FOSSology v2 REST API.
//!
//! Every call checks that the configured base URL and token (and, for
//! folder-scoped calls, the folder id) are present before sending anything.
//! Failures are logged and answered with `None`, `false` or
//! [`ScanStatus::Failed`]; nothing here returns an error to the caller.

use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::fossology::config::RestConfig;
use crate::fossology::rest::models::{FossologyResponse, ScanJobRequest, find_text};
use crate::fossology::types::{JobKind, RemoteJob, ScanStatus};

const REPORT_FORMAT_SPDX2: &str = "spdx2";

/// Marker for a poll that has not reached a final answer yet.
#[derive(Debug)]
struct NotReady;

pub struct RestClient {
    http: Client,
    config: RestConfig,
}

impl RestClient {
    pub fn new(config: RestConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: RestConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.url(path))
            .bearer_auth(&self.config.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.url(path))
            .bearer_auth(&self.config.token)
    }

    fn is_configured(&self, needs_folder: bool) -> bool {
        let missing_folder = needs_folder && self.config.folder_id.trim().is_empty();
        if self.config.base_url.is_empty() || self.config.token.trim().is_empty() || missing_folder {
            error!(
                "REST configuration is missing values! Url: <{}>, Token set: {}, Folder: <{}>",
                self.config.base_url,
                !self.config.token.trim().is_empty(),
                self.config.folder_id
            );
            return false;
        }
        true
    }

    /// Attempts allowed by the report timeout at the configured poll delay.
    fn poll_attempts(&self) -> usize {
        let delay = self.config.poll_delay.max(Duration::from_millis(1));
        (self.config.report_timeout.as_millis() / delay.as_millis()).max(1) as usize
    }

    /// Whether the server accepts the token; `GET folders` must answer 200.
    pub async fn check_connection(&self) -> bool {
        if !self.is_configured(false) {
            return false;
        }
        match self.get("folders").send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                error!("Connection check against {} failed: {}", self.config.base_url, e);
                false
            }
        }
    }

    /// Upload `content` as `filename` into the configured folder.
    pub async fn upload_file(
        &self,
        filename: &str,
        content: Box<dyn AsyncRead + Send + Unpin>,
        description: Option<&str>,
    ) -> Option<u32> {
        if !self.is_configured(true) {
            return None;
        }
        if filename.trim().is_empty() {
            error!("Refusing upload without a filename");
            return None;
        }

        let part = Part::stream(Body::wrap_stream(ReaderStream::new(content)))
            .file_name(filename.to_string());
        let form = Form::new().part("fileInput", part);

        let mut request = self
            .post("uploads")
            .header("folderId", &self.config.folder_id)
            .header("uploadType", "file")
            .multipart(form);
        if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
            request = request.header("uploadDescription", description);
        }

        debug!("Uploading {} to {}", filename, self.url("uploads"));
        match request.send().await {
            Ok(response) => {
                let upload_id = created_id(response, "upload", FossologyResponse::message_id).await;
                if let Some(upload_id) = upload_id {
                    info!("Uploaded {} as upload {}", filename, upload_id);
                }
                upload_id
            }
            Err(e) => {
                error!("Uploading {} failed: {}", filename, e);
                None
            }
        }
    }

    /// Start the fixed set of scanners on `upload_id`.
    pub async fn start_scanning(&self, upload_id: u32) -> Option<RemoteJob> {
        if !self.is_configured(true) {
            return None;
        }

        let request = self
            .post("jobs")
            .header("folderId", &self.config.folder_id)
            .header("uploadId", upload_id.to_string())
            .json(&ScanJobRequest::default());

        debug!("Starting scan job for upload {}", upload_id);
        match request.send().await {
            Ok(response) => created_id(response, "scan job", FossologyResponse::message_id)
                .await
                .map(|job_id| RemoteJob {
                    job_id,
                    kind: JobKind::Scan,
                }),
            Err(e) => {
                error!("Starting scan of upload {} failed: {}", upload_id, e);
                None
            }
        }
    }

    pub async fn check_scan_status(&self, job_id: u32) -> ScanStatus {
        if !self.is_configured(false) {
            return ScanStatus::Failed;
        }

        let Some(body) = self.get_json(&format!("jobs/{}", job_id)).await else {
            return ScanStatus::Failed;
        };
        let Some(status) = find_text(&body, "status") else {
            error!("No status in job {} response: {}", job_id, body);
            return ScanStatus::Failed;
        };
        let eta = body.get("eta").cloned().unwrap_or(Value::Null);
        debug!("Job {} is {} (eta {})", job_id, status, eta);
        ScanStatus::from_job_status(&status)
    }

    /// Ask for an SPDX2 report of `upload_id`.
    pub async fn start_report(&self, upload_id: u32) -> Option<RemoteJob> {
        if !self.is_configured(false) {
            return None;
        }

        let request = self
            .get("report")
            .header("uploadId", upload_id.to_string())
            .header("reportFormat", REPORT_FORMAT_SPDX2);

        match request.send().await {
            Ok(response) => created_id(response, "report", FossologyResponse::trailing_id)
                .await
                .map(|job_id| RemoteJob {
                    job_id,
                    kind: JobKind::Report,
                }),
            Err(e) => {
                error!("Starting report for upload {} failed: {}", upload_id, e);
                None
            }
        }
    }

    /// Download a generated report. `None` while it is still being generated.
    pub async fn get_report(&self, report_id: u32) -> Option<Vec<u8>> {
        if !self.is_configured(false) {
            return None;
        }

        let request = self
            .get(&format!("report/{}", report_id))
            .header(reqwest::header::ACCEPT, "text/plain");
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Downloading report {} failed: {}", report_id, e);
                return None;
            }
        };

        match response.status() {
            status if status.is_success() => match response.bytes().await {
                Ok(bytes) => Some(bytes.to_vec()),
                Err(e) => {
                    error!("Reading report {} failed: {}", report_id, e);
                    None
                }
            },
            StatusCode::SERVICE_UNAVAILABLE => {
                info!("Report {} is not ready yet", report_id);
                None
            }
            status => {
                error!("Downloading report {} answered {}", report_id, status);
                None
            }
        }
    }

    /// Status of the unpack job belonging to `upload_id`.
    pub async fn check_unpack_status(&self, upload_id: u32) -> Option<ScanStatus> {
        if !self.is_configured(false) {
            return None;
        }

        let body = self.get_json(&format!("jobs?upload={}", upload_id)).await?;
        let Some(jobs) = body.as_array() else {
            error!("Job list for upload {} is not an array: {}", upload_id, body);
            return None;
        };

        let wanted = upload_id.to_string();
        let job = jobs
            .iter()
            .find(|job| find_text(job, "uploadId").as_deref() == Some(wanted.as_str()));
        let Some(job) = job else {
            warn!("No job information for upload {}", upload_id);
            return None;
        };

        let status = find_text(job, "status")?;
        debug!("Unpack status of upload {}: {}", upload_id, status);
        Some(ScanStatus::from_job_status(&status))
    }

    /// Folder that contains `upload_id`.
    pub async fn folder_of_upload(&self, upload_id: u32) -> Option<u32> {
        if !self.is_configured(false) {
            return None;
        }

        let body = self.get_json(&format!("uploads/{}", upload_id)).await?;
        let folder = match body.get("folderid") {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        if folder.is_none() {
            error!("Upload {} response has no usable folderid: {}", upload_id, body);
        }
        folder
    }

    /// Poll `job_id` until it leaves the running state or the report timeout passes.
    pub async fn wait_for_scan(&self, job_id: u32) -> ScanStatus {
        let client = self;
        let backoff = ConstantBuilder::default()
            .with_delay(self.config.poll_delay)
            .with_max_times(self.poll_attempts());

        let result = (|| async move {
            match client.check_scan_status(job_id).await {
                ScanStatus::Running => Err(NotReady),
                status => Ok(status),
            }
        })
        .retry(backoff)
        .await;

        result.unwrap_or_else(|_| {
            warn!(
                "Job {} still running after {:?}",
                job_id, self.config.report_timeout
            );
            ScanStatus::Running
        })
    }

    /// Poll for report `report_id` until it is available or the report timeout passes.
    pub async fn fetch_report(&self, report_id: u32) -> Option<Vec<u8>> {
        let client = self;
        let backoff = ConstantBuilder::default()
            .with_delay(self.config.poll_delay)
            .with_max_times(self.poll_attempts());

        let result = (|| async move { client.get_report(report_id).await.ok_or(NotReady) })
            .retry(backoff)
            .await;

        match result {
            Ok(report) => Some(report),
            Err(_) => {
                warn!(
                    "Report {} not available after {:?}",
                    report_id, self.config.report_timeout
                );
                None
            }
        }
    }

    async fn get_json(&self, path: &str) -> Option<Value> {
        let response = match self.get(path).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("GET {} failed: {}", path, e);
                return None;
            }
        };
        if !response.status().is_success() {
            error!("GET {} answered {}", path, response.status());
            return None;
        }
        match response.json::<Value>().await {
            Ok(body) => Some(body),
            Err(e) => {
                error!("GET {} returned malformed JSON: {}", path, e);
                None
            }
        }
    }
}

/// Id carried by a creation response; only 2xx answers count.
async fn created_id(
    response: Response,
    what: &str,
    extract: fn(&FossologyResponse) -> Option<u32>,
) -> Option<u32> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("Creating {} failed with status {}: {}", what, status, body);
        return None;
    }

    let body = match response.json::<FossologyResponse>().await {
        Ok(body) => body,
        Err(e) => {
            error!("Malformed {} response: {}", what, e);
            return None;
        }
    };
    if !body.is_success() {
        error!(
            "Creating {} failed with code {}: {}",
            what,
            body.code,
            body.message_text()
        );
        return None;
    }

    let id = extract(&body);
    if id.is_none() {
        error!("Non-numeric {} id in response: '{}'", what, body.message_text());
    }
    id
}
