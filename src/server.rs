//! HTTP boundary.
//!
//! `POST /` (and `POST /api/InboundHtmlToPdf`) accepts a JSON render request
//! guarded by a function key. Everything that parses gets a 200 with an
//! [`ApiResponse`] body; only fatal errors produce another status.

use crate::config::ServiceConfig;
use crate::convert::convert;
use crate::credential::CredentialChain;
use crate::error::Html2PdfError;
use crate::output::{ApiResponse, RenderRequest};
use crate::pipeline::render::{BrowserlessRenderer, PdfRenderer};
use crate::pipeline::upload::{GraphUploader, ReportUploader};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self as axum_middleware, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Header carrying the function key.
pub const FUNCTION_KEY_HEADER: &str = "x-functions-key";

/// Query parameter carrying the function key.
pub const FUNCTION_KEY_QUERY: &str = "code";

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub renderer: Arc<dyn PdfRenderer>,
    pub uploader: Arc<dyn ReportUploader>,
}

impl AppState {
    /// Wire the production renderer and uploader from `config`.
    pub fn from_config(config: ServiceConfig) -> Result<Self, Html2PdfError> {
        let renderer = BrowserlessRenderer::new(config.renderer_url()?, config.render_timeout);
        let credential = Arc::new(CredentialChain::from_config(&config));
        let http = reqwest::Client::builder()
            .user_agent(concat!("html2pdf-graph/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Html2PdfError::Internal(format!("HTTP client: {e}")))?;
        let uploader = GraphUploader::new(&config, credential, http);

        Ok(Self {
            config: Arc::new(config),
            renderer: Arc::new(renderer),
            uploader: Arc::new(uploader),
        })
    }
}

impl IntoResponse for Html2PdfError {
    fn into_response(self) -> Response {
        let status = match &self {
            Html2PdfError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Html2PdfError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Build the router with auth, the body limit and request logging.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(convert_html))
        .route("/api/InboundHtmlToPdf", post(convert_html))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_function_key,
        ))
        .layer(axum_middleware::from_fn(log_requests))
        .with_state(state)
}

/// Serve until Ctrl-C / SIGTERM.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), Html2PdfError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Html2PdfError::Serve)
}

async fn convert_html(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse>, Html2PdfError> {
    let request: RenderRequest = serde_json::from_slice(&body)
        .map_err(|e| Html2PdfError::MalformedRequest(e.to_string()))?;

    let response = convert(
        request,
        state.config.environment,
        state.renderer.as_ref(),
        state.uploader.as_ref(),
    )
    .await;

    info!("Sending Response");
    Ok(Json(response))
}

/// Reject requests without the configured function key.
///
/// The key may arrive in the header or the `code` query parameter; either
/// one matching is enough.
async fn require_function_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let expected = state.config.function_key.as_bytes();
    let is_key = |key: &[u8]| bool::from(key.ct_eq(expected));

    let header_ok = request
        .headers()
        .get_all(FUNCTION_KEY_HEADER)
        .iter()
        .any(|v| is_key(v.as_bytes()));
    let query_ok = request.uri().query().is_some_and(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .filter(|(k, _)| k == FUNCTION_KEY_QUERY)
            .any(|(_, v)| is_key(v.as_bytes()))
    });

    if !(header_ok || query_ok) {
        return Html2PdfError::Unauthorized.into_response();
    }

    next.run(request).await
}

/// Run the request inside a span with a fresh request id and log the result.
async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %request_id, method = %method, path = %path);
    let start = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    span.in_scope(|| {
        if status.is_server_error() {
            error!(status = status.as_u16(), elapsed_ms, "request failed");
        } else if status.is_client_error() {
            warn!(status = status.as_u16(), elapsed_ms, "client request error");
        } else {
            info!(status = status.as_u16(), elapsed_ms, "request completed");
        }
    });
    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
