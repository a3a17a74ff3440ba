//! Pipeline stages for one HTML-to-PDF request.
//!
//! Each submodule implements exactly one step, so every external service
//! sits behind its own seam and can be replaced in tests.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ (buffer) ──▶ encode
//!                    └──▶ upload
//! (remote     (Bytes)     (base64)
//!  browser)               (resumable session)
//! ```
//!
//! 1. [`render`]: drive the remote browser; runs in `spawn_blocking`
//!    because the DevTools client is blocking
//! 2. [`encode`]: base64 the materialised PDF for the inline response
//! 3. [`upload`]: two-phase resumable upload of the same buffer

pub mod encode;
pub mod render;
pub mod upload;

use std::future::Future;
use std::time::Duration;

/// Await `fut`, giving up after `limit` when one is configured.
///
/// Returns `None` when the limit elapsed first.
pub(crate) async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}
