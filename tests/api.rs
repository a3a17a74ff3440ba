//! Integration tests for html2pdf-graph.
//!
//! The storage API and the identity endpoints are replaced by an
//! `httpmock` server; the remote browser is replaced by a stub renderer.
//! Nothing here needs network access or credentials.
//!
//! Run with:
//!   cargo test --test api

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::Local;
use html2pdf_graph::config::{ClientSecret, IdentityEndpoint};
use html2pdf_graph::credential::ManagedIdentityEndpoint;
use html2pdf_graph::{
    report_file_name, router, AppState, CredentialChain, CredentialError, CredentialSource,
    DeploymentEnvironment, GraphUploader, PdfArtifact, PdfRenderer, RenderError, ReportUploader,
    ServiceConfig, UploadOutcome,
};
use http_body_util::BodyExt;
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

const FUNCTION_KEY: &str = "fn-key";
const WEB_URL: &str = "https://contoso.sharepoint.com/Reports/Acme20240305BECReport.pdf";

fn config(server: &MockServer) -> ServiceConfig {
    ServiceConfig::builder()
        .environment(DeploymentEnvironment::Development)
        .client_secret("tenant", "client", "secret")
        .authority_host(server.base_url())
        .graph_base_url(server.url("/v1.0"))
        .browserless_api_key("bl-key")
        .drive_id("d1")
        .parent_id("p1")
        .function_key(FUNCTION_KEY)
        .build()
        .expect("valid config")
}

fn uploader(server: &MockServer) -> GraphUploader {
    let config = config(server);
    let credential = Arc::new(CredentialChain::from_config(&config));
    GraphUploader::new(&config, credential, reqwest::Client::new())
}

fn session_path(file_name: &str) -> String {
    format!("/v1.0/drives/d1/items/p1:/{file_name}:/createUploadSession")
}

async fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/tenant/oauth2/v2.0/token")
                .body_includes("grant_type=client_credentials");
            then.status(200).json_body(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "tok"
            }));
        })
        .await
}

async fn mock_session<'a>(server: &'a MockServer, file_name: &str) -> httpmock::Mock<'a> {
    let upload_url = server.url("/upload/session-1");
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(session_path(file_name))
                .header("authorization", "Bearer tok")
                .json_body(json!({ "@microsoft.graph.conflictBehavior": "rename" }));
            then.status(200).json_body(json!({
                "uploadUrl": upload_url,
                "expirationDateTime": "2024-03-05T10:00:00Z",
                "nextExpectedRanges": ["0-"]
            }));
        })
        .await
}

async fn mock_slice<'a>(
    server: &'a MockServer,
    content_range: &str,
    status: u16,
    body: Value,
) -> httpmock::Mock<'a> {
    server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/upload/session-1")
                .header("content-range", content_range);
            then.status(status).json_body(body);
        })
        .await
}

fn pdf_of(len: usize) -> Vec<u8> {
    b"%PDF-1.7\n".iter().copied().cycle().take(len).collect()
}

struct StubRenderer {
    result: Result<Vec<u8>, RenderError>,
    calls: AtomicUsize,
}

impl StubRenderer {
    fn ok(pdf: Vec<u8>) -> Self {
        Self {
            result: Ok(pdf),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(err: RenderError) -> Self {
        Self {
            result: Err(err),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PdfRenderer for StubRenderer {
    async fn render(&self, _html: &str) -> Result<PdfArtifact, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map(PdfArtifact::new)
    }
}

struct StubUploader;

#[async_trait]
impl ReportUploader for StubUploader {
    async fn upload(&self, _client_name: &str, _pdf: Bytes) -> UploadOutcome {
        UploadOutcome::Uploaded {
            web_url: WEB_URL.into(),
        }
    }
}

fn stub_state(server: &MockServer, renderer: StubRenderer) -> AppState {
    AppState {
        config: Arc::new(config(server)),
        renderer: Arc::new(renderer),
        uploader: Arc::new(StubUploader),
    }
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

// ── Resumable upload ─────────────────────────────────────────────────────────

#[tokio::test]
async fn uploads_800_kib_in_three_ordered_slices() {
    let server = MockServer::start_async().await;
    let token = mock_token(&server).await;
    let session = mock_session(&server, "Acme.pdf").await;
    let first = mock_slice(
        &server,
        "bytes 0-327679/819200",
        202,
        json!({ "nextExpectedRanges": ["327680-"] }),
    )
    .await;
    let second = mock_slice(
        &server,
        "bytes 327680-655359/819200",
        202,
        json!({ "nextExpectedRanges": ["655360-"] }),
    )
    .await;
    let last = mock_slice(
        &server,
        "bytes 655360-819199/819200",
        201,
        json!({ "id": "01ITEM", "name": "Acme.pdf", "webUrl": WEB_URL }),
    )
    .await;

    let outcome = uploader(&server)
        .upload_as("Acme.pdf", Bytes::from(pdf_of(800 * 1024)))
        .await;

    assert_eq!(
        outcome,
        UploadOutcome::Uploaded {
            web_url: WEB_URL.into()
        }
    );
    token.assert_async().await;
    session.assert_async().await;
    first.assert_async().await;
    second.assert_async().await;
    last.assert_async().await;
}

#[tokio::test]
async fn small_payload_is_a_single_slice() {
    let server = MockServer::start_async().await;
    let _token = mock_token(&server).await;
    let _session = mock_session(&server, "Tiny.pdf").await;
    let only = mock_slice(
        &server,
        "bytes 0-1023/1024",
        200,
        json!({ "webUrl": WEB_URL }),
    )
    .await;

    let outcome = uploader(&server)
        .upload_as("Tiny.pdf", Bytes::from(pdf_of(1024)))
        .await;

    assert!(outcome.is_success(), "got: {outcome:?}");
    only.assert_hits_async(1).await;
}

#[tokio::test]
async fn session_failure_sends_no_slices() {
    let server = MockServer::start_async().await;
    let _token = mock_token(&server).await;
    let session = server
        .mock_async(|when, then| {
            when.method(POST).path(session_path("Acme.pdf"));
            then.status(403)
                .json_body(json!({ "error": { "code": "accessDenied", "message": "Access denied" } }));
        })
        .await;
    let slices = server
        .mock_async(|when, then| {
            when.method(PUT);
            then.status(202);
        })
        .await;

    let outcome = uploader(&server)
        .upload_as("Acme.pdf", Bytes::from(pdf_of(4096)))
        .await;

    session.assert_async().await;
    assert_eq!(slices.hits_async().await, 0);
    let UploadOutcome::Failed { error } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(error.contains("403"), "got: {error}");
    assert!(error.contains("accessDenied"), "got: {error}");
}

#[tokio::test]
async fn rejected_slice_cancels_the_session() {
    let server = MockServer::start_async().await;
    let _token = mock_token(&server).await;
    let _session = mock_session(&server, "Acme.pdf").await;
    let _first = mock_slice(
        &server,
        "bytes 0-327679/819200",
        202,
        json!({ "nextExpectedRanges": ["327680-"] }),
    )
    .await;
    let second = mock_slice(
        &server,
        "bytes 327680-655359/819200",
        416,
        json!({ "error": { "code": "invalidRange" } }),
    )
    .await;
    let third = mock_slice(&server, "bytes 655360-819199/819200", 201, json!({})).await;
    let cancel = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/upload/session-1");
            then.status(204);
        })
        .await;

    let outcome = uploader(&server)
        .upload_as("Acme.pdf", Bytes::from(pdf_of(800 * 1024)))
        .await;

    second.assert_async().await;
    assert_eq!(third.hits_async().await, 0);
    cancel.assert_async().await;
    let UploadOutcome::Failed { error } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(error.contains("416"), "got: {error}");
    assert!(error.contains("invalidRange"), "got: {error}");
}

#[tokio::test]
async fn completed_item_without_web_url_is_a_failure() {
    let server = MockServer::start_async().await;
    let _token = mock_token(&server).await;
    let _session = mock_session(&server, "Acme.pdf").await;
    let _only = mock_slice(&server, "bytes 0-99/100", 201, json!({ "id": "01ITEM" })).await;

    let outcome = uploader(&server)
        .upload_as("Acme.pdf", Bytes::from(pdf_of(100)))
        .await;

    assert!(!outcome.is_success());
    assert!(outcome.location_or_error().contains("no web URL"));
}

#[tokio::test]
async fn rejected_token_fails_before_session() {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST).path("/tenant/oauth2/v2.0/token");
            then.status(401)
                .json_body(json!({ "error": "invalid_client" }));
        })
        .await;
    let session = mock_session(&server, "Acme.pdf").await;

    let outcome = uploader(&server)
        .upload_as("Acme.pdf", Bytes::from(pdf_of(100)))
        .await;

    token.assert_async().await;
    assert_eq!(session.hits_async().await, 0);
    assert!(
        outcome.location_or_error().contains("invalid_client"),
        "got: {outcome:?}"
    );
}

// ── Credential chain ─────────────────────────────────────────────────────────

#[tokio::test]
async fn chain_falls_through_to_next_source() {
    let server = MockServer::start_async().await;
    let identity = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/msi/token")
                .header("x-identity-header", "id-secret")
                .query_param("resource", "https://graph.microsoft.com")
                .query_param("api-version", "2019-08-01");
            then.status(500).body("identity endpoint unavailable");
        })
        .await;
    let secret = mock_token(&server).await;

    let chain = CredentialChain::new(vec![
        CredentialSource::ManagedIdentity(ManagedIdentityEndpoint::AppService(IdentityEndpoint {
            endpoint: server.url("/msi/token"),
            header: "id-secret".into(),
        })),
        CredentialSource::StaticSecret {
            authority_host: server.base_url(),
            secret: ClientSecret {
                tenant_id: "tenant".into(),
                client_id: "client".into(),
                client_secret: "secret".into(),
            },
        },
    ]);

    let token = chain
        .token(&reqwest::Client::new())
        .await
        .expect("second source succeeds");

    assert_eq!(token.secret(), "tok");
    identity.assert_async().await;
    secret.assert_async().await;
}

#[tokio::test]
async fn chain_reports_every_failure_when_exhausted() {
    let server = MockServer::start_async().await;
    let _imds = server
        .mock_async(|when, then| {
            when.method(GET).path("/imds").header("metadata", "true");
            then.status(400).body("no identity assigned");
        })
        .await;

    let chain = CredentialChain::new(vec![
        CredentialSource::ManagedIdentity(ManagedIdentityEndpoint::Imds(server.url("/imds"))),
        CredentialSource::ManagedIdentity(ManagedIdentityEndpoint::Imds(server.url("/imds"))),
    ]);

    let err = chain.token(&reqwest::Client::new()).await.unwrap_err();
    let CredentialError::Exhausted(errors) = &err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
    assert!(err.to_string().contains("no identity assigned"));
}

// ── HTTP boundary ────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_function_key_is_unauthorized() {
    let server = MockServer::start_async().await;
    let renderer = StubRenderer::ok(pdf_of(64));
    let app = router(stub_state(&server, renderer));

    let response = app
        .oneshot(post("/", r#"{"Html":"<p/>","ClientName":"Acme"}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_function_key_is_unauthorized() {
    let server = MockServer::start_async().await;
    let app = router(stub_state(&server, StubRenderer::ok(pdf_of(64))));

    let mut request = post("/", "{}");
    request
        .headers_mut()
        .insert("x-functions-key", "not-the-key".parse().expect("header"));
    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn query_key_is_accepted_despite_wrong_header() {
    let server = MockServer::start_async().await;
    let app = router(stub_state(&server, StubRenderer::ok(pdf_of(64))));

    let mut request = post("/?code=fn-key", r#"{"Html":"<p/>","ClientName":"Acme"}"#);
    request
        .headers_mut()
        .insert("x-functions-key", "stale-key".parse().expect("header"));
    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn html_larger_than_framework_default_is_accepted() {
    let server = MockServer::start_async().await;
    let pdf = pdf_of(256);
    let app = router(stub_state(&server, StubRenderer::ok(pdf.clone())));

    let html = format!("<img src=\"data:image/png;base64,{}\">", "A".repeat(3 * 1024 * 1024));
    let body = json!({ "Html": html, "ClientName": "Acme" }).to_string();
    let response = app
        .oneshot(post("/?code=fn-key", &body))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true, "got: {body}");
}

#[tokio::test]
async fn body_over_configured_limit_is_rejected() {
    let server = MockServer::start_async().await;
    let config = ServiceConfig {
        max_body_bytes: 1024,
        ..config(&server)
    };
    let state = AppState {
        config: Arc::new(config),
        renderer: Arc::new(StubRenderer::ok(pdf_of(64))),
        uploader: Arc::new(StubUploader),
    };

    let body = json!({ "Html": "x".repeat(4096), "ClientName": "Acme" }).to_string();
    let response = router(state)
        .oneshot(post("/?code=fn-key", &body))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let server = MockServer::start_async().await;
    let app = router(stub_state(&server, StubRenderer::ok(pdf_of(64))));

    let response = app
        .oneshot(post("/?code=fn-key", "{not json"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn successful_request_returns_all_fields() {
    let server = MockServer::start_async().await;
    let pdf = pdf_of(2048);
    let app = router(stub_state(&server, StubRenderer::ok(pdf.clone())));

    let response = app
        .oneshot(post(
            "/api/InboundHtmlToPdf?code=fn-key",
            r#"{"Html":"<h1>Report</h1>","ClientName":"Acme"}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let object = body.as_object().expect("object");
    for key in ["base64", "success", "uploadUrl", "uploadErrors"] {
        assert!(object.contains_key(key), "missing {key}: {body}");
    }
    assert_eq!(body["success"], true);
    assert_eq!(body["uploadUrl"], WEB_URL);
    assert!(body["uploadErrors"].is_null());
    let decoded = STANDARD
        .decode(body["base64"].as_str().expect("base64"))
        .expect("valid base64");
    assert_eq!(decoded, pdf);
}

#[tokio::test]
async fn render_failure_is_reported_with_200() {
    let server = MockServer::start_async().await;
    let renderer = StubRenderer::failing(RenderError::Connect("connection refused".into()));
    let app = router(stub_state(&server, renderer));

    let mut request = post("/", r#"{"Html":"<p/>","ClientName":"Acme"}"#);
    request
        .headers_mut()
        .insert("x-functions-key", FUNCTION_KEY.parse().expect("header"));
    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["base64"].is_null());
    assert!(body["uploadUrl"].is_null());
    assert!(body["uploadErrors"]
        .as_str()
        .expect("error text")
        .contains("connection refused"));
}

#[tokio::test]
async fn end_to_end_upload_matches_returned_base64() {
    let server = MockServer::start_async().await;
    let file_name = report_file_name("Acme", Local::now().date_naive());
    let _token = mock_token(&server).await;
    let session = mock_session(&server, &file_name).await;
    let pdf = pdf_of(5000);
    let body = pdf.clone();
    let slice = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/upload/session-1")
                .header("content-range", "bytes 0-4999/5000")
                .body(String::from_utf8(body).expect("ascii pdf"));
            then.status(201).json_body(json!({ "webUrl": WEB_URL }));
        })
        .await;

    let config = config(&server);
    let credential = Arc::new(CredentialChain::from_config(&config));
    let state = AppState {
        uploader: Arc::new(GraphUploader::new(
            &config,
            credential,
            reqwest::Client::new(),
        )),
        renderer: Arc::new(StubRenderer::ok(pdf.clone())),
        config: Arc::new(config),
    };

    let response = router(state)
        .oneshot(post(
            "/?code=fn-key",
            r#"{"Html":"<h1>Report</h1>","ClientName":"Acme"}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true, "got: {body}");
    assert_eq!(body["uploadUrl"], WEB_URL);
    let decoded = STANDARD
        .decode(body["base64"].as_str().expect("base64"))
        .expect("valid base64");
    assert_eq!(decoded, pdf);
    session.assert_async().await;
    slice.assert_async().await;
}
