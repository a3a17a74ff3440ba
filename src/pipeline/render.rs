//! HTML → PDF on a remote headless browser.
//!
//! ## Why spawn_blocking?
//!
//! `headless_chrome` drives the DevTools protocol with a blocking API: every
//! call parks the calling thread until the browser answers. Running the whole
//! session inside `tokio::task::spawn_blocking` keeps the Tokio worker
//! threads free while the remote browser loads and prints the page.
//!
//! ## Session lifetime
//!
//! Each render opens its own websocket session and closes it before
//! returning. The session sits inside a `SessionGuard` whose `Drop` closes
//! the tab exactly once on every exit path, including a failed load, a
//! failed print or a panic inside the blocking task. The browser
//! connection is released when the session itself is dropped.

use crate::error::RenderError;
use crate::output::PdfArtifact;
use crate::pipeline::bounded;
use async_trait::async_trait;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, Tab};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Anything that turns an HTML document into PDF bytes.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Render `html` as the full content of a page and print it.
    ///
    /// Returns the fully drained PDF; an empty PDF is an error.
    async fn render(&self, html: &str) -> Result<PdfArtifact, RenderError>;
}

/// Renderer backed by a browserless-style remote Chrome.
#[derive(Clone)]
pub struct BrowserlessRenderer {
    /// `wss://host?token=...`
    endpoint: Url,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for BrowserlessRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut endpoint = self.endpoint.clone();
        endpoint.set_query(None);
        f.debug_struct("BrowserlessRenderer")
            .field("endpoint", &endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BrowserlessRenderer {
    pub fn new(endpoint: Url, timeout: Option<Duration>) -> Self {
        Self { endpoint, timeout }
    }
}

#[async_trait]
impl PdfRenderer for BrowserlessRenderer {
    async fn render(&self, html: &str) -> Result<PdfArtifact, RenderError> {
        let start = Instant::now();
        let endpoint = self.endpoint.to_string();
        let html = html.to_owned();
        let idle = self.timeout;

        let task = tokio::task::spawn_blocking(move || render_blocking(&endpoint, &html, idle));

        let pdf = match bounded(self.timeout, task).await {
            Some(joined) => {
                joined.map_err(|e| RenderError::Internal(format!("render task panicked: {e}")))??
            }
            None => {
                // The blocking task keeps running; its session guard closes
                // the remote browser once the task finishes.
                return Err(RenderError::Timeout(self.timeout.unwrap_or_default()));
            }
        };

        info!(
            "PDF captured: {} bytes in {}ms",
            pdf.len(),
            start.elapsed().as_millis()
        );
        Ok(pdf)
    }
}

/// The page operations one render needs.
trait PageSession {
    /// Replace the page document with `html` and wait for it to load.
    fn load(&self, html: &str) -> Result<(), RenderError>;
    fn print(&self) -> Result<Vec<u8>, RenderError>;
    /// Release the remote page. Called exactly once per session.
    fn close(&self);
}

/// Closes the wrapped session when dropped, on every exit path.
struct SessionGuard<S: PageSession>(S);

impl<S: PageSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.0.close();
        debug!("Remote browser session closed");
    }
}

/// Resolves once the document has fired `load`.
const WAIT_FOR_LOAD: &str = "new Promise(resolve => document.readyState === 'complete' \
    ? resolve(true) \
    : window.addEventListener('load', () => resolve(true), { once: true }))";

/// One remote browser connection and the page opened on it.
struct RemoteSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl RemoteSession {
    fn open(endpoint: &str, idle: Option<Duration>) -> Result<Self, RenderError> {
        let browser = match idle {
            Some(limit) => Browser::connect_with_timeout(endpoint.to_string(), limit),
            None => Browser::connect(endpoint.to_string()),
        }
        .map_err(|e| RenderError::Connect(format!("{e:#}")))?;
        debug!("Connected to remote browser");

        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::Page(format!("{e:#}")))?;
        if let Some(limit) = idle {
            tab.set_default_timeout(limit);
        }

        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

impl PageSession for RemoteSession {
    /// `document.open/write/close` is the same mechanism browser automation
    /// libraries use for "set content": relative URLs resolve against
    /// `about:blank` and scripts in the document run. Printing waits for
    /// `load` so stylesheets, images and fonts are in place.
    fn load(&self, html: &str) -> Result<(), RenderError> {
        let literal =
            serde_json::to_string(html).map_err(|e| RenderError::Content(e.to_string()))?;
        let script = format!("document.open(); document.write({literal}); document.close();");
        self.tab
            .evaluate(&script, false)
            .map_err(|e| RenderError::Content(format!("{e:#}")))?;
        self.tab
            .evaluate(WAIT_FOR_LOAD, true)
            .map_err(|e| RenderError::Content(format!("page did not finish loading: {e:#}")))?;
        Ok(())
    }

    fn print(&self) -> Result<Vec<u8>, RenderError> {
        let options = PrintToPdfOptions {
            print_background: Some(true),
            prefer_css_page_size: Some(true),
            ..Default::default()
        };
        self.tab
            .print_to_pdf(Some(options))
            .map_err(|e| RenderError::Pdf(format!("{e:#}")))
    }

    fn close(&self) {
        if let Err(e) = self.tab.close(false) {
            warn!("Failed to close remote tab cleanly: {e:#}");
        }
    }
}

/// Blocking body of a render: connect, load, print, close.
fn render_blocking(
    endpoint: &str,
    html: &str,
    idle: Option<Duration>,
) -> Result<PdfArtifact, RenderError> {
    render_with(RemoteSession::open(endpoint, idle)?, html)
}

/// Load and print on an open session, closing it before returning.
fn render_with<S: PageSession>(session: S, html: &str) -> Result<PdfArtifact, RenderError> {
    let session = SessionGuard(session);
    session.0.load(html)?;
    info!("Converting PDF");
    let bytes = session.0.print()?;
    drop(session);

    if bytes.is_empty() {
        return Err(RenderError::EmptyOutput);
    }
    Ok(PdfArtifact::new(bytes))
}
