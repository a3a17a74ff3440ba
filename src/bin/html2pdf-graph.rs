//! Server binary for html2pdf-graph.
//!
//! A thin shim over the library crate that maps flags and environment
//! variables to `ServiceConfig`, sets up logging, and serves until
//! Ctrl-C / SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use html2pdf_graph::config::{
    DEFAULT_AUTHORITY_HOST, DEFAULT_BROWSERLESS_ENDPOINT, DEFAULT_GRAPH_BASE_URL,
    DEFAULT_MAX_BODY_BYTES,
};
use html2pdf_graph::error::Html2PdfError;
use html2pdf_graph::{server, AppState, DeploymentEnvironment, ServiceConfig};
use std::io;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local development with a static client secret
  AZURE_FUNCTIONS_ENVIRONMENT=Development \
  tenantId=... clientId=... clientSecret=... \
  browserlessApiKey=... driveId=... parentId=... FUNCTION_KEY=... \
  html2pdf-graph --port 7071

  # Hosted: managed identity, JSON logs
  html2pdf-graph --log-format json

  # Call it
  curl -X POST "http://localhost:8080/?code=$FUNCTION_KEY" \
       -d '{"Html":"<h1>Report</h1>","ClientName":"Acme"}'

ENVIRONMENT VARIABLES:
  AZURE_FUNCTIONS_ENVIRONMENT  "Development" selects the static client secret
  browserlessApiKey            Rendering service token
  BROWSERLESS_ENDPOINT         Rendering service websocket endpoint
  tenantId, clientId,
  clientSecret                 Static credential (Development only)
  IDENTITY_ENDPOINT,
  IDENTITY_HEADER              App Service managed identity (Production)
  driveId, parentId            Upload destination
  FUNCTION_KEY                 Key callers pass in x-functions-key or ?code=
  RUST_LOG                     Overrides the log filter
"#;

/// Render HTML to PDF and upload it to a drive folder.
#[derive(Parser, Debug)]
#[command(
    name = "html2pdf-graph",
    version,
    about = "Render HTML to PDF on a remote browser and upload it to a Graph drive",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "HTML2PDF_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "FUNCTIONS_CUSTOMHANDLER_PORT", default_value_t = 8080)]
    port: u16,

    /// Deployment environment ("Development" or anything else for Production).
    #[arg(long, env = "AZURE_FUNCTIONS_ENVIRONMENT", default_value = "Production")]
    environment: String,

    /// Rendering service API key.
    #[arg(long, env = "browserlessApiKey", hide_env_values = true)]
    browserless_api_key: String,

    /// Rendering service websocket endpoint.
    #[arg(long, env = "BROWSERLESS_ENDPOINT", default_value = DEFAULT_BROWSERLESS_ENDPOINT)]
    browserless_endpoint: String,

    /// Directory tenant (Development).
    #[arg(long, env = "tenantId")]
    tenant_id: Option<String>,

    /// Application (client) id (Development).
    #[arg(long, env = "clientId")]
    client_id: Option<String>,

    /// Application secret (Development).
    #[arg(long, env = "clientSecret", hide_env_values = true)]
    client_secret: Option<String>,

    /// App Service managed identity endpoint.
    #[arg(long, env = "IDENTITY_ENDPOINT")]
    identity_endpoint: Option<String>,

    /// App Service managed identity header secret.
    #[arg(long, env = "IDENTITY_HEADER", hide_env_values = true)]
    identity_header: Option<String>,

    /// Identity platform authority.
    #[arg(long, env = "AZURE_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY_HOST)]
    authority_host: String,

    /// Graph API root.
    #[arg(long, env = "GRAPH_BASE_URL", default_value = DEFAULT_GRAPH_BASE_URL)]
    graph_base_url: String,

    /// Destination drive id.
    #[arg(long, env = "driveId")]
    drive_id: String,

    /// Destination parent folder id.
    #[arg(long, env = "parentId")]
    parent_id: String,

    /// Key callers must present.
    #[arg(long, env = "FUNCTION_KEY", hide_env_values = true)]
    function_key: String,

    /// Render timeout in seconds (unbounded when unset).
    #[arg(long, env = "RENDER_TIMEOUT_SECS")]
    render_timeout: Option<u64>,

    /// Per-call upload timeout in seconds (unbounded when unset).
    #[arg(long, env = "UPLOAD_TIMEOUT_SECS")]
    upload_timeout: Option<u64>,

    /// Largest accepted request body in bytes.
    #[arg(long, env = "HTML2PDF_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Log line format.
    #[arg(long, env = "HTML2PDF_LOG_FORMAT", value_enum, default_value = "compact")]
    log_format: LogFormat,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogFormat {
    Compact,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    match cli.log_format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init(),
    }

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli).context("Invalid configuration")?;
    info!("Starting html2pdf-graph in {}", config.environment);

    let state = AppState::from_config(config).context("Failed to initialise service")?;

    // ── Serve ────────────────────────────────────────────────────────────
    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| Html2PdfError::Bind {
            addr: addr.clone(),
            source,
        })?;

    server::serve(listener, state).await.context("Server stopped")?;
    Ok(())
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli) -> Result<ServiceConfig, Html2PdfError> {
    let mut builder = ServiceConfig::builder()
        .environment(DeploymentEnvironment::from_flag(&cli.environment))
        .browserless_endpoint(&cli.browserless_endpoint)
        .browserless_api_key(&cli.browserless_api_key)
        .authority_host(&cli.authority_host)
        .graph_base_url(&cli.graph_base_url)
        .drive_id(&cli.drive_id)
        .parent_id(&cli.parent_id)
        .function_key(&cli.function_key)
        .render_timeout(cli.render_timeout.map(Duration::from_secs))
        .upload_timeout(cli.upload_timeout.map(Duration::from_secs))
        .max_body_bytes(cli.max_body_bytes);

    if let (Some(tenant), Some(client), Some(secret)) =
        (&cli.tenant_id, &cli.client_id, &cli.client_secret)
    {
        builder = builder.client_secret(tenant, client, secret);
    }

    if let (Some(endpoint), Some(header)) = (&cli.identity_endpoint, &cli.identity_header) {
        builder = builder.identity_endpoint(endpoint, header);
    }

    builder.build()
}
