//! Request and response data model.
//!
//! The PDF is materialised exactly once into a [`PdfArtifact`]; both the
//! base64 encoder and the uploader read from that one immutable buffer, so
//! there is never a single-use stream with two consumers.

use crate::error::RenderError;
use crate::pipeline::encode;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Inbound request body: `{ "Html": ..., "ClientName": ... }`.
///
/// Both fields are optional on the wire; absent values render and name
/// as empty strings. No further validation happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(rename = "Html", alias = "html", default)]
    pub html: Option<String>,

    #[serde(rename = "ClientName", alias = "clientName", default)]
    pub client_name: Option<String>,
}

impl RenderRequest {
    pub fn html(&self) -> &str {
        self.html.as_deref().unwrap_or_default()
    }

    pub fn client_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or_default()
    }
}

/// Rendered PDF bytes, fully drained from the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfArtifact(Bytes);

impl PdfArtifact {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// A cheap handle on the same buffer, for the uploader.
    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of one resumable upload. Exactly one of URL or error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The backend acknowledged the last slice and returned the item URL.
    Uploaded { web_url: String },
    /// Session creation or a slice failed; the error text is kept verbatim.
    Failed { error: String },
}

impl UploadOutcome {
    pub fn failed(error: impl ToString) -> Self {
        UploadOutcome::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }

    /// The URL on success, the error description otherwise.
    pub fn location_or_error(&self) -> &str {
        match self {
            UploadOutcome::Uploaded { web_url } => web_url,
            UploadOutcome::Failed { error } => error,
        }
    }
}

/// JSON body returned for every request that reaches the responding stage.
///
/// All four keys are always present; absent values serialise as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub base64: Option<String>,
    pub success: bool,
    #[serde(rename = "uploadUrl")]
    pub upload_url: Option<String>,
    #[serde(rename = "uploadErrors")]
    pub upload_errors: Option<String>,
}

impl ApiResponse {
    /// Combine the rendered PDF and the upload outcome.
    ///
    /// `success` is true iff the PDF is non-empty and the upload produced a
    /// non-empty URL. Every other combination is a failure with error text
    /// and no base64/URL payload.
    pub fn assemble(pdf: &PdfArtifact, outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Uploaded { web_url } if !pdf.is_empty() && !web_url.is_empty() => {
                ApiResponse {
                    base64: Some(encode::to_base64(pdf)),
                    success: true,
                    upload_url: Some(web_url),
                    upload_errors: None,
                }
            }
            UploadOutcome::Uploaded { web_url } if !web_url.is_empty() => {
                Self::failure(RenderError::EmptyOutput.to_string())
            }
            UploadOutcome::Uploaded { .. } => {
                Self::failure(crate::error::UploadError::MissingWebUrl.to_string())
            }
            UploadOutcome::Failed { error } if pdf.is_empty() => {
                Self::failure(format!("{}; {error}", RenderError::EmptyOutput))
            }
            UploadOutcome::Failed { error } => Self::failure(error),
        }
    }

    /// Response for a request whose render never produced a PDF.
    pub fn render_failed(err: &RenderError) -> Self {
        Self::failure(err.to_string())
    }

    fn failure(message: String) -> Self {
        ApiResponse {
            base64: None,
            success: false,
            upload_url: None,
            upload_errors: Some(message),
        }
    }
}
