//! Minimal Graph drive client for resumable uploads.
//!
//! Only the three calls the upload protocol needs are implemented:
//!
//! * `POST drives/{drive}/items/{parent}:/{name}:/createUploadSession`
//! * `PUT {uploadUrl}` with `Content-Range` for each slice
//! * `DELETE {uploadUrl}` to abandon a session
//!
//! Session creation is authenticated with a bearer token from the
//! [`CredentialChain`]. The upload URL is pre-authorised by the backend, so
//! slices and cancellation carry no `Authorization` header.

use crate::credential::CredentialChain;
use crate::error::UploadError;
use bytes::Bytes;
use reqwest::header::CONTENT_RANGE;
use reqwest::StatusCode;
use serde::Deserialize;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Conflict policy sent with every session request.
pub const CONFLICT_BEHAVIOR: &str = "rename";

/// Destination of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub drive_id: String,
    pub parent_id: String,
    pub file_name: String,
}

/// Server-issued handle for a sequence of slice uploads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    #[serde(default)]
    pub expiration_date_time: Option<String>,
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

/// The created file, as returned with the final slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SliceProgress {
    #[serde(default)]
    next_expected_ranges: Vec<String>,
}

/// Backend acknowledgement of one slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceAck {
    /// More bytes are expected.
    Accepted { next_expected_ranges: Vec<String> },
    /// The file is complete.
    Completed(DriveItem),
}

/// `Content-Range` value for `range` out of `total` bytes (inclusive end).
pub fn content_range(range: &Range<usize>, total: usize) -> String {
    format!("bytes {}-{}/{}", range.start, range.end.saturating_sub(1), total)
}

/// Graph client bound to one credential chain.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: Url,
    credential: Arc<CredentialChain>,
}

impl GraphClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        credential: Arc<CredentialChain>,
    ) -> Result<Self, UploadError> {
        let base_url =
            Url::parse(base_url).map_err(|_| UploadError::InvalidUrl(base_url.to_string()))?;
        Ok(Self {
            http,
            base_url,
            credential,
        })
    }

    /// `…/drives/{drive}/items/{parent}:/{file}:/createUploadSession`
    pub fn session_url(&self, target: &UploadTarget) -> Result<Url, UploadError> {
        let parent = format!("{}:", target.parent_id);
        let file = format!("{}:", target.file_name);
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UploadError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend([
                "drives",
                target.drive_id.as_str(),
                "items",
                parent.as_str(),
                file.as_str(),
                "createUploadSession",
            ]);
        Ok(url)
    }

    /// Open an upload session for `target` with conflict behaviour "rename".
    pub async fn create_upload_session(
        &self,
        target: &UploadTarget,
    ) -> Result<UploadSession, UploadError> {
        let url = self.session_url(target)?;
        let token = self.credential.token(&self.http).await?;

        debug!("Creating upload session at {}", url.path());
        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(&serde_json::json!({
                "@microsoft.graph.conflictBehavior": CONFLICT_BEHAVIOR,
            }))
            .send()
            .await
            .map_err(|e| UploadError::SessionRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::SessionRejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<UploadSession>()
            .await
            .map_err(|e| UploadError::SessionRequest(format!("unreadable session response: {e}")))
    }

    /// PUT one slice covering `range` of a `total`-byte file.
    pub async fn upload_slice(
        &self,
        session: &UploadSession,
        slice: Bytes,
        range: Range<usize>,
        total: usize,
    ) -> Result<SliceAck, UploadError> {
        let request_error = |detail: String| UploadError::SliceRequest {
            start: range.start,
            end: range.end,
            detail,
        };

        let response = self
            .http
            .put(&session.upload_url)
            .header(CONTENT_RANGE, content_range(&range, total))
            .body(slice)
            .send()
            .await
            .map_err(|e| request_error(e.to_string()))?;

        match response.status() {
            StatusCode::ACCEPTED => {
                let progress = response.json::<SliceProgress>().await.unwrap_or_default();
                Ok(SliceAck::Accepted {
                    next_expected_ranges: progress.next_expected_ranges,
                })
            }
            StatusCode::OK | StatusCode::CREATED => response
                .json::<DriveItem>()
                .await
                .map(SliceAck::Completed)
                .map_err(|e| request_error(format!("unreadable item response: {e}"))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(UploadError::SliceRejected {
                    start: range.start,
                    end: range.end,
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Abandon `session`; the backend discards any bytes already received.
    pub async fn cancel_upload_session(&self, session: &UploadSession) -> Result<(), UploadError> {
        let response = self
            .http
            .delete(&session.upload_url)
            .send()
            .await
            .map_err(|e| UploadError::SessionRequest(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(UploadError::SessionRejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}
