//! # html2pdf-graph
//!
//! An HTTP endpoint that renders an HTML document to PDF on a remote headless
//! browser, uploads the PDF to a Graph drive folder through a resumable upload
//! session, and answers with both the base64 PDF and the uploaded file's URL.
//!
//! ## Request Flow
//!
//! ```text
//! POST / {Html, ClientName}
//!  │
//!  ├─ 1. Render   remote Chrome over wss://…?token= (spawn_blocking)
//!  ├─ 2. Buffer   PDF drained once into an immutable `Bytes`
//!  ├─ 3. Upload   createUploadSession (rename on conflict) + 320 KiB slices
//!  └─ 4. Respond  200 {base64, success, uploadUrl, uploadErrors}
//! ```
//!
//! Failures of the browser or the storage backend never change the HTTP
//! status: they come back as `success: false` with the error text in
//! `uploadErrors`. Only a malformed body (400) or a bad function key (401)
//! is answered otherwise.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use html2pdf_graph::{server, AppState, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .browserless_api_key(std::env::var("browserlessApiKey")?)
//!         .drive_id(std::env::var("driveId")?)
//!         .parent_id(std::env::var("parentId")?)
//!         .function_key(std::env::var("FUNCTION_KEY")?)
//!         .build()?;
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     server::serve(listener, AppState::from_config(config)?).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `html2pdf-graph` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod credential;
pub mod error;
pub mod graph;
pub mod output;
pub mod pipeline;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DeploymentEnvironment, ServiceConfig, ServiceConfigBuilder};
pub use convert::convert;
pub use credential::{CredentialChain, CredentialSource};
pub use error::{CredentialError, Html2PdfError, RenderError, UploadError};
pub use output::{ApiResponse, PdfArtifact, RenderRequest, UploadOutcome};
pub use pipeline::render::{BrowserlessRenderer, PdfRenderer};
pub use pipeline::upload::{report_file_name, GraphUploader, ReportUploader, SLICE_SIZE};
pub use server::{router, AppState};
