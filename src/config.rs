//! Service configuration.
//!
//! Every setting the service needs is collected into one immutable
//! [`ServiceConfig`], built once at process start via
//! [`ServiceConfigBuilder`] and shared by `Arc` with every component.
//! Request handling never reads the process environment.

use crate::error::Html2PdfError;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default remote-browser websocket endpoint.
pub const DEFAULT_BROWSERLESS_ENDPOINT: &str = "wss://chrome.browserless.io";

/// Default Microsoft identity platform authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default Graph API root (v1.0).
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default inbound body limit (100 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Permission scope requested for every storage token.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Which credential path the service runs with.
///
/// Chosen once at startup from `AZURE_FUNCTIONS_ENVIRONMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentEnvironment {
    /// Local/staging runs: static tenant/client/secret triple.
    Development,
    /// Hosted runs: ambient managed identity. (default)
    #[default]
    Production,
}

impl DeploymentEnvironment {
    /// `Development` only for the exact string `"Development"`.
    pub fn from_flag(flag: &str) -> Self {
        if flag == "Development" {
            DeploymentEnvironment::Development
        } else {
            DeploymentEnvironment::Production
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentEnvironment::Development => "Development",
            DeploymentEnvironment::Production => "Production",
        }
    }
}

impl fmt::Display for DeploymentEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant/client/secret triple for the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// App Service managed-identity endpoint (`IDENTITY_ENDPOINT` / `IDENTITY_HEADER`).
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityEndpoint {
    pub endpoint: String,
    pub header: String,
}

impl fmt::Debug for IdentityEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityEndpoint")
            .field("endpoint", &self.endpoint)
            .field("header", &"<redacted>")
            .finish()
    }
}

/// Configuration for the HTML-to-PDF service.
///
/// # Example
/// ```rust
/// use html2pdf_graph::{DeploymentEnvironment, ServiceConfig};
///
/// let config = ServiceConfig::builder()
///     .environment(DeploymentEnvironment::Production)
///     .browserless_api_key("token")
///     .drive_id("b!drive")
///     .parent_id("01PARENT")
///     .function_key("fn-key")
///     .build()
///     .unwrap();
/// assert_eq!(config.renderer_url().unwrap().query(), Some("token=token"));
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Credential path. Default: Production.
    pub environment: DeploymentEnvironment,

    /// Websocket endpoint of the rendering service, without the token.
    pub browserless_endpoint: String,

    /// Token appended to the rendering endpoint as `?token=`.
    pub browserless_api_key: String,

    /// Static credential, required in Development.
    pub client_secret: Option<ClientSecret>,

    /// App Service identity endpoint; when absent the instance metadata
    /// service is used for managed identity.
    pub identity_endpoint: Option<IdentityEndpoint>,

    /// Identity platform authority for the client-credentials grant.
    pub authority_host: String,

    /// Graph API root used for upload sessions.
    pub graph_base_url: String,

    /// Destination drive identifier.
    pub drive_id: String,

    /// Destination parent folder identifier.
    pub parent_id: String,

    /// Key callers must present in `x-functions-key` or `?code=`.
    pub function_key: String,

    /// Upper bound for one render (connect + load + print). Default: none.
    pub render_timeout: Option<Duration>,

    /// Upper bound for token + session creation, and for each slice. Default: none.
    pub upload_timeout: Option<Duration>,

    /// Largest accepted request body. Default: 100 MiB.
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: DeploymentEnvironment::default(),
            browserless_endpoint: DEFAULT_BROWSERLESS_ENDPOINT.to_string(),
            browserless_api_key: String::new(),
            client_secret: None,
            identity_endpoint: None,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            drive_id: String::new(),
            parent_id: String::new(),
            function_key: String::new(),
            render_timeout: None,
            upload_timeout: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("environment", &self.environment)
            .field("browserless_endpoint", &self.browserless_endpoint)
            .field("browserless_api_key", &"<redacted>")
            .field("client_secret", &self.client_secret)
            .field("identity_endpoint", &self.identity_endpoint)
            .field("authority_host", &self.authority_host)
            .field("graph_base_url", &self.graph_base_url)
            .field("drive_id", &self.drive_id)
            .field("parent_id", &self.parent_id)
            .field("function_key", &"<redacted>")
            .field("render_timeout", &self.render_timeout)
            .field("upload_timeout", &self.upload_timeout)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// The rendering endpoint with the API key attached as `token`.
    pub fn renderer_url(&self) -> Result<Url, Html2PdfError> {
        let mut url = Url::parse(&self.browserless_endpoint).map_err(|e| {
            Html2PdfError::InvalidConfig(format!(
                "browserless endpoint '{}' is not a URL: {e}",
                self.browserless_endpoint
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("token", &self.browserless_api_key);
        Ok(url)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn environment(mut self, env: DeploymentEnvironment) -> Self {
        self.config.environment = env;
        self
    }

    pub fn browserless_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.browserless_endpoint = endpoint.into();
        self
    }

    pub fn browserless_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.browserless_api_key = key.into();
        self
    }

    pub fn client_secret(
        mut self,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.config.client_secret = Some(ClientSecret {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        });
        self
    }

    pub fn identity_endpoint(mut self, endpoint: impl Into<String>, header: impl Into<String>) -> Self {
        self.config.identity_endpoint = Some(IdentityEndpoint {
            endpoint: endpoint.into(),
            header: header.into(),
        });
        self
    }

    pub fn authority_host(mut self, host: impl Into<String>) -> Self {
        self.config.authority_host = host.into();
        self
    }

    pub fn graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph_base_url = url.into();
        self
    }

    pub fn drive_id(mut self, id: impl Into<String>) -> Self {
        self.config.drive_id = id.into();
        self
    }

    pub fn parent_id(mut self, id: impl Into<String>) -> Self {
        self.config.parent_id = id.into();
        self
    }

    pub fn function_key(mut self, key: impl Into<String>) -> Self {
        self.config.function_key = key.into();
        self
    }

    pub fn render_timeout(mut self, limit: Option<Duration>) -> Self {
        self.config.render_timeout = limit;
        self
    }

    pub fn upload_timeout(mut self, limit: Option<Duration>) -> Self {
        self.config.upload_timeout = limit;
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.config.max_body_bytes = limit;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Html2PdfError> {
        let c = &self.config;

        for (name, value) in [
            ("browserless API key", &c.browserless_api_key),
            ("drive id", &c.drive_id),
            ("parent id", &c.parent_id),
            ("function key", &c.function_key),
        ] {
            if value.trim().is_empty() {
                return Err(Html2PdfError::InvalidConfig(format!("{name} must be set")));
            }
        }

        let renderer = c.renderer_url()?;
        if !matches!(renderer.scheme(), "ws" | "wss") {
            return Err(Html2PdfError::InvalidConfig(format!(
                "browserless endpoint must use ws:// or wss://, got '{}'",
                c.browserless_endpoint
            )));
        }

        for (name, value) in [
            ("authority host", &c.authority_host),
            ("Graph base URL", &c.graph_base_url),
        ] {
            Url::parse(value).map_err(|e| {
                Html2PdfError::InvalidConfig(format!("{name} '{value}' is not a URL: {e}"))
            })?;
        }

        if c.environment == DeploymentEnvironment::Development {
            match &c.client_secret {
                Some(s)
                    if !s.tenant_id.is_empty()
                        && !s.client_id.is_empty()
                        && !s.client_secret.is_empty() => {}
                _ => {
                    return Err(Html2PdfError::InvalidConfig(
                        "Development requires tenantId, clientId and clientSecret".into(),
                    ))
                }
            }
        }

        if matches!(c.render_timeout, Some(d) if d.is_zero())
            || matches!(c.upload_timeout, Some(d) if d.is_zero())
        {
            return Err(Html2PdfError::InvalidConfig(
                "timeouts must be greater than zero".into(),
            ));
        }

        if c.max_body_bytes == 0 {
            return Err(Html2PdfError::InvalidConfig(
                "max body size must be greater than zero".into(),
            ));
        }

        Ok(self.config)
    }
}
