//! Resumable upload of the rendered report.
//!
//! Two phases, strictly in order:
//!
//! 1. **Session**: ask the drive for an upload session at
//!    `{parent}/{file name}` with conflict behaviour `rename`.
//! 2. **Slices**: PUT the payload in 320 KiB slices, each tagged with its
//!    byte range, one at a time, lowest offset first. The backend requires
//!    contiguous, increasing ranges, so slices are never sent concurrently.
//!
//! Neither phase propagates an error: [`ReportUploader::upload`] always
//! returns an [`UploadOutcome`] whose failure text is the error's own
//! `Display` output.

use crate::config::ServiceConfig;
use crate::credential::CredentialChain;
use crate::error::UploadError;
use crate::graph::{DriveItem, GraphClient, SliceAck, UploadSession, UploadTarget};
use crate::output::UploadOutcome;
use crate::pipeline::bounded;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Local, NaiveDate};
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Slice size for the resumable protocol (a multiple of 320 KiB, as the
/// backend requires).
pub const SLICE_SIZE: usize = 320 * 1024;

/// `{clientName}{YYYYMMDD}BECReport.pdf`; the client name is used verbatim.
pub fn report_file_name(client_name: &str, date: NaiveDate) -> String {
    format!("{client_name}{}BECReport.pdf", date.format("%Y%m%d"))
}

/// Split `0..total` into contiguous ranges of at most `slice_size` bytes.
pub fn slice_ranges(total: usize, slice_size: usize) -> Vec<Range<usize>> {
    let slice_size = slice_size.max(1);
    (0..total)
        .step_by(slice_size)
        .map(|start| start..(start + slice_size).min(total))
        .collect()
}

/// Destination for rendered reports.
#[async_trait]
pub trait ReportUploader: Send + Sync {
    /// Upload `pdf` under the report name for `client_name`. Never fails;
    /// errors come back as [`UploadOutcome::Failed`].
    async fn upload(&self, client_name: &str, pdf: Bytes) -> UploadOutcome;
}

/// Uploads reports to a Graph drive folder.
#[derive(Debug, Clone)]
pub struct GraphUploader {
    credential: Arc<CredentialChain>,
    http: reqwest::Client,
    graph_base_url: String,
    drive_id: String,
    parent_id: String,
    timeout: Option<Duration>,
}

impl GraphUploader {
    pub fn new(config: &ServiceConfig, credential: Arc<CredentialChain>, http: reqwest::Client) -> Self {
        Self {
            credential,
            http,
            graph_base_url: config.graph_base_url.clone(),
            drive_id: config.drive_id.clone(),
            parent_id: config.parent_id.clone(),
            timeout: config.upload_timeout,
        }
    }

    /// Upload `pdf` as `file_name` in the configured folder.
    pub async fn upload_as(&self, file_name: &str, pdf: Bytes) -> UploadOutcome {
        let start = Instant::now();
        match self.try_upload(file_name, pdf).await {
            Ok(web_url) => {
                info!(
                    "Uploaded '{}' in {}ms",
                    file_name,
                    start.elapsed().as_millis()
                );
                UploadOutcome::Uploaded { web_url }
            }
            Err(e) => {
                error!("Upload of '{}' failed: {}", file_name, e);
                UploadOutcome::failed(e)
            }
        }
    }

    async fn try_upload(&self, file_name: &str, pdf: Bytes) -> Result<String, UploadError> {
        if pdf.is_empty() {
            return Err(UploadError::EmptyPayload);
        }

        let client = self.credential.client(self.http.clone(), &self.graph_base_url)?;
        let target = UploadTarget {
            drive_id: self.drive_id.clone(),
            parent_id: self.parent_id.clone(),
            file_name: file_name.to_string(),
        };

        // Phase 1: session. A failed session ends the upload here.
        let created = bounded(self.timeout, client.create_upload_session(&target))
            .await
            .unwrap_or_else(|| Err(self.timed_out("Upload session creation")));
        let session = match created {
            Ok(session) => session,
            Err(e) => return Err(e),
        };
        debug!(
            "Upload session open (expires {})",
            session.expiration_date_time.as_deref().unwrap_or("unknown")
        );

        // Phase 2: slices.
        match self.transfer_slices(&client, &session, &pdf).await {
            Ok(item) => item
                .web_url
                .filter(|url| !url.is_empty())
                .ok_or(UploadError::MissingWebUrl),
            Err(e) => {
                if let Err(cancel) = client.cancel_upload_session(&session).await {
                    warn!("Could not cancel upload session: {}", cancel);
                }
                Err(e)
            }
        }
    }

    /// Send every slice in byte order until the backend reports completion.
    async fn transfer_slices(
        &self,
        client: &GraphClient,
        session: &UploadSession,
        pdf: &Bytes,
    ) -> Result<DriveItem, UploadError> {
        let total = pdf.len();
        let ranges = slice_ranges(total, SLICE_SIZE);
        let count = ranges.len();

        for (i, range) in ranges.into_iter().enumerate() {
            debug!("Slice {}/{}: bytes {}..{}", i + 1, count, range.start, range.end);
            let slice = pdf.slice(range.clone());
            let ack = bounded(
                self.timeout,
                client.upload_slice(session, slice, range, total),
            )
            .await
            .unwrap_or_else(|| Err(self.timed_out("Slice upload")))?;

            if let SliceAck::Completed(item) = ack {
                return Ok(item);
            }
        }

        Err(UploadError::Incomplete { sent: total, total })
    }

    fn timed_out(&self, stage: &'static str) -> UploadError {
        UploadError::Timeout {
            stage,
            limit: self.timeout.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ReportUploader for GraphUploader {
    async fn upload(&self, client_name: &str, pdf: Bytes) -> UploadOutcome {
        let file_name = report_file_name(client_name, Local::now().date_naive());
        self.upload_as(&file_name, pdf).await
    }
}
