//! Request orchestration: render, buffer, upload, respond.
//!
//! One call handles one request end to end and keeps no state afterwards:
//!
//! ```text
//! Received → Rendering → Buffering → Uploading → Responding → Done
//! ```
//!
//! Every path that gets past parsing produces an [`ApiResponse`]; failures
//! of the renderer or the storage backend are reported inside it rather
//! than as errors.

use crate::config::DeploymentEnvironment;
use crate::error::RenderError;
use crate::output::{ApiResponse, RenderRequest};
use crate::pipeline::render::PdfRenderer;
use crate::pipeline::upload::ReportUploader;
use std::time::Instant;
use tracing::{error, info};

/// Convert one request into its response body.
///
/// # Steps
/// 1. Render the HTML on the remote browser (fully drained into memory).
/// 2. Hand a handle on the same buffer to the uploader.
/// 3. Assemble the response: base64 + URL on success, error text otherwise.
pub async fn convert(
    request: RenderRequest,
    environment: DeploymentEnvironment,
    renderer: &dyn PdfRenderer,
    uploader: &dyn ReportUploader,
) -> ApiResponse {
    let total_start = Instant::now();
    info!("Received Request for new Document");
    info!("Environment {}", environment);

    // ── Step 1: Render ───────────────────────────────────────────────────
    let render_start = Instant::now();
    let pdf = match renderer.render(request.html()).await {
        Ok(pdf) if pdf.is_empty() => {
            error!("Conversion FAILED! Renderer returned no bytes");
            return ApiResponse::render_failed(&RenderError::EmptyOutput);
        }
        Ok(pdf) => pdf,
        Err(e) => {
            error!("Conversion FAILED! {}", e);
            return ApiResponse::render_failed(&e);
        }
    };
    info!(
        "PDF Stream Captured: {} bytes in {}ms",
        pdf.len(),
        render_start.elapsed().as_millis()
    );

    // ── Step 2: Upload ───────────────────────────────────────────────────
    info!("Starting File Upload");
    let outcome = uploader.upload(request.client_name(), pdf.bytes()).await;
    info!("File Task Completed");

    // ── Step 3: Respond ──────────────────────────────────────────────────
    let response = ApiResponse::assemble(&pdf, outcome);
    if response.success {
        info!(
            "Conversion Succeeded in {}ms",
            total_start.elapsed().as_millis()
        );
    } else {
        error!("Conversion FAILED! See API Response");
    }
    response
}
