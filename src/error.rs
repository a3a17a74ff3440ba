//! Error types for the html2pdf-graph service.
//!
//! Two kinds of failure exist and they travel differently:
//!
//! * [`Html2PdfError`]: **Fatal**. The request (or the process) cannot be
//!   served at all: bad configuration, a body that is not JSON, a missing
//!   function key, a listener that cannot bind. These reach the HTTP
//!   boundary and become a non-200 status.
//!
//! * [`RenderError`], [`CredentialError`] and [`UploadError`]: **Captured**.
//!   An external service failed. They never cross the orchestrator; their
//!   `Display` text is copied verbatim into the `uploadErrors` field of a
//!   200 response with `success: false`.

use std::time::Duration;
use thiserror::Error;

/// Fatal errors surfaced to the process or to the HTTP boundary.
#[derive(Debug, Error)]
pub enum Html2PdfError {
    // ── Startup ───────────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    // ── Request ───────────────────────────────────────────────────────────
    /// The inbound body could not be parsed as a render request.
    #[error("Malformed request body: {0}")]
    MalformedRequest(String),

    /// The function key was missing or did not match.
    #[error("Missing or invalid function key")]
    Unauthorized,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A captured failure of the remote rendering service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// The websocket connection to the browser could not be established.
    #[error("Could not connect to the rendering service: {0}")]
    Connect(String),

    /// The remote browser refused to open a page.
    #[error("Could not open a page on the rendering service: {0}")]
    Page(String),

    /// Loading the HTML as document content failed.
    #[error("Could not load HTML into the page: {0}")]
    Content(String),

    /// The print-to-PDF call failed.
    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    /// The rendering service answered with zero bytes.
    #[error("Rendering service returned an empty PDF")]
    EmptyOutput,

    /// The render did not finish within the configured limit.
    #[error("Rendering timed out after {0:?}")]
    Timeout(Duration),

    /// The blocking render task panicked or was cancelled.
    #[error("Render task failed: {0}")]
    Internal(String),
}

/// A captured failure while acquiring a storage access token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The token endpoint could not be reached or returned garbage.
    #[error("{source_name}: token request failed: {detail}")]
    TokenRequest { source_name: String, detail: String },

    /// The token endpoint answered with a non-success status.
    #[error("{source_name}: token request rejected (HTTP {status}): {body}")]
    TokenRejected {
        source_name: String,
        status: u16,
        body: String,
    },

    /// Every source in the chain failed.
    #[error("No credential source produced a token: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

/// A captured failure of the resumable upload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// No access token could be acquired for the storage API.
    #[error("Authentication failed: {0}")]
    Credential(#[from] CredentialError),

    /// The createUploadSession call did not get a response.
    #[error("Upload session request failed: {0}")]
    SessionRequest(String),

    /// The storage API refused to create an upload session.
    #[error("Upload session creation rejected (HTTP {status}): {body}")]
    SessionRejected { status: u16, body: String },

    /// A slice PUT did not get a response.
    #[error("Slice {start}-{end} failed: {detail}")]
    SliceRequest {
        start: usize,
        end: usize,
        detail: String,
    },

    /// The storage API rejected a slice.
    #[error("Slice {start}-{end} rejected (HTTP {status}): {body}")]
    SliceRejected {
        start: usize,
        end: usize,
        status: u16,
        body: String,
    },

    /// The upload completed but the created item carries no web URL.
    #[error("Upload completed but the storage API returned no web URL")]
    MissingWebUrl,

    /// Every slice was accepted yet the backend never reported completion.
    #[error("Upload did not complete after {sent} of {total} bytes were sent")]
    Incomplete { sent: usize, total: usize },

    /// Nothing to upload.
    #[error("Refusing to upload an empty payload")]
    EmptyPayload,

    /// A storage URL could not be built.
    #[error("Invalid storage URL '{0}'")]
    InvalidUrl(String),

    /// A storage call did not finish within the configured limit.
    #[error("{stage} timed out after {limit:?}")]
    Timeout { stage: &'static str, limit: Duration },
}
