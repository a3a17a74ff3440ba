//! Base64 encoding of the materialised PDF.
//!
//! The response carries the PDF inline as standard (padded) base64 so a
//! caller can save it without a second round-trip to storage.

use crate::output::PdfArtifact;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Encode the whole PDF buffer as standard base64.
pub fn to_base64(pdf: &PdfArtifact) -> String {
    let b64 = STANDARD.encode(pdf.as_slice());
    debug!("Encoded PDF {} bytes → {} bytes base64", pdf.len(), b64.len());
    b64
}
