//! Storage API credentials.
//!
//! The credential path is decided once at startup: a Development process
//! carries a static tenant/client/secret triple, a Production process relies
//! on the platform's managed identity. Both are [`CredentialSource`]
//! variants collected into an ordered [`CredentialChain`]; request handling
//! only ever asks the chain for an authenticated [`GraphClient`].
//!
//! Tokens are fetched fresh for each request. Caching and refresh belong
//! to the identity platform, not to this service.

use crate::config::{
    ClientSecret, DeploymentEnvironment, IdentityEndpoint, ServiceConfig, GRAPH_DEFAULT_SCOPE,
};
use crate::error::{CredentialError, UploadError};
use crate::graph::GraphClient;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Instance metadata service token endpoint (managed identity fallback).
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_API_VERSION: &str = "2018-02-01";

/// A bearer token for the storage API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Where a managed-identity token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentityEndpoint {
    /// App Service / Functions identity endpoint.
    AppService(IdentityEndpoint),
    /// Instance metadata service at the given URL.
    Imds(String),
}

/// One way of obtaining a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// OAuth2 client-credentials grant with a static secret.
    StaticSecret {
        authority_host: String,
        secret: ClientSecret,
    },
    /// Ambient platform identity; no embedded secret.
    ManagedIdentity(ManagedIdentityEndpoint),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

impl CredentialSource {
    pub fn name(&self) -> &'static str {
        match self {
            CredentialSource::StaticSecret { .. } => "ClientSecretCredential",
            CredentialSource::ManagedIdentity(_) => "ManagedIdentityCredential",
        }
    }

    /// Request a token for `scope` (e.g. `https://graph.microsoft.com/.default`).
    pub async fn token(
        &self,
        http: &reqwest::Client,
        scope: &str,
    ) -> Result<AccessToken, CredentialError> {
        let request = match self {
            CredentialSource::StaticSecret {
                authority_host,
                secret,
            } => {
                let url = format!(
                    "{}/{}/oauth2/v2.0/token",
                    authority_host.trim_end_matches('/'),
                    secret.tenant_id
                );
                http.post(url).form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", secret.client_id.as_str()),
                    ("client_secret", secret.client_secret.as_str()),
                    ("scope", scope),
                ])
            }
            CredentialSource::ManagedIdentity(ManagedIdentityEndpoint::AppService(identity)) => http
                .get(&identity.endpoint)
                .header("X-IDENTITY-HEADER", &identity.header)
                .query(&[
                    ("resource", resource_for(scope)),
                    ("api-version", APP_SERVICE_API_VERSION),
                ]),
            CredentialSource::ManagedIdentity(ManagedIdentityEndpoint::Imds(url)) => http
                .get(url)
                .header("Metadata", "true")
                .query(&[
                    ("resource", resource_for(scope)),
                    ("api-version", IMDS_API_VERSION),
                ]),
        };

        let response = request
            .send()
            .await
            .map_err(|e| self.request_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::TokenRejected {
                source_name: self.name().to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.request_error(format!("unreadable token response: {e}")))?;
        if parsed.access_token.is_empty() {
            return Err(self.request_error("token response carried no access_token".into()));
        }

        debug!("{} issued a token", self.name());
        Ok(AccessToken::new(parsed.access_token))
    }

    fn request_error(&self, detail: String) -> CredentialError {
        CredentialError::TokenRequest {
            source_name: self.name().to_string(),
            detail,
        }
    }
}

/// v1 identity endpoints want a resource, not a scope.
fn resource_for(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Ordered credential sources; the first one that yields a token wins.
#[derive(Debug, Clone, Default)]
pub struct CredentialChain {
    sources: Vec<CredentialSource>,
    scope: String,
}

impl CredentialChain {
    pub fn new(sources: Vec<CredentialSource>) -> Self {
        Self {
            sources,
            scope: GRAPH_DEFAULT_SCOPE.to_string(),
        }
    }

    /// Select the credential path for the configured environment.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let sources: Vec<CredentialSource> = match config.environment {
            DeploymentEnvironment::Development => config
                .client_secret
                .iter()
                .map(|secret| CredentialSource::StaticSecret {
                    authority_host: config.authority_host.clone(),
                    secret: secret.clone(),
                })
                .collect(),
            DeploymentEnvironment::Production => {
                let endpoint = match &config.identity_endpoint {
                    Some(identity) => ManagedIdentityEndpoint::AppService(identity.clone()),
                    None => ManagedIdentityEndpoint::Imds(IMDS_TOKEN_ENDPOINT.to_string()),
                };
                vec![CredentialSource::ManagedIdentity(endpoint)]
            }
        };

        let chain = Self::new(sources);
        info!(
            "{} credentials chosen: {}",
            config.environment,
            chain
                .sources
                .iter()
                .map(CredentialSource::name)
                .collect::<Vec<_>>()
                .join(", ")
        );
        chain
    }

    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Walk the chain in order and return the first token.
    pub async fn token(&self, http: &reqwest::Client) -> Result<AccessToken, CredentialError> {
        let mut errors = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.token(http, &self.scope).await {
                Ok(token) => return Ok(token),
                Err(e) => {
                    warn!("{} failed: {}", source.name(), e);
                    errors.push(e.to_string());
                }
            }
        }
        Err(CredentialError::Exhausted(errors))
    }

    /// Construct a storage client authenticated through this chain.
    pub fn client(
        self: &Arc<Self>,
        http: reqwest::Client,
        graph_base_url: &str,
    ) -> Result<GraphClient, UploadError> {
        GraphClient::new(http, graph_base_url, Arc::clone(self))
    }
}
