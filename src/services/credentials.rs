use crate::constants::dashboard;
use crate::constants::http::{CONTENT_TYPE_FORM, CONTENT_TYPE_JSON};
use crate::errors::ToolError;
use crate::openapi::HttpMethod;
use crate::services::token_store::{TokenGrant, TokenStore};
use crate::services::transport::{HttpResponse, HttpTransport, OutboundRequest};
use crate::utils::redact::redact_text;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

pub const DASHBOARD_URL_ENV: &str = "ALGOLIA_MCP_DASHBOARD_URL";
pub const TOKEN_URL_ENV: &str = "ALGOLIA_MCP_TOKEN_URL";
pub const CLIENT_ID_ENV: &str = "ALGOLIA_MCP_CLIENT_ID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    /// Analytics/log region as reported by the dashboard (`de`, `us`, ...).
    pub log_region: Option<String>,
}

/// Source of API keys and application metadata.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn api_key(&self, application_id: &str) -> Result<String, ToolError>;
    async fn application(&self, application_id: &str) -> Result<Application, ToolError>;
}

/// One fixed `applicationId:apiKey` pair.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    application_id: String,
    api_key: String,
}

impl StaticCredentials {
    pub fn new(application_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Parses `applicationId:apiKey`; both halves must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, ToolError> {
        match raw.split_once(':') {
            Some((app, key)) if !app.trim().is_empty() && !key.trim().is_empty() => {
                Ok(Self::new(app.trim(), key.trim()))
            }
            _ => Err(ToolError::invalid_params(
                "Credentials must be in the form applicationId:apiKey",
            )),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn api_key(&self, application_id: &str) -> Result<String, ToolError> {
        if application_id != self.application_id {
            return Err(ToolError::credential(format!(
                "No API key configured for application {}",
                application_id
            ))
            .with_hint(format!(
                "The server was started with credentials for {}",
                self.application_id
            )));
        }
        Ok(self.api_key.clone())
    }

    async fn application(&self, application_id: &str) -> Result<Application, ToolError> {
        Ok(Application {
            id: application_id.to_string(),
            log_region: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub base_url: Url,
    pub token_url: Url,
    pub client_id: String,
}

impl DashboardConfig {
    /// Built-in endpoints, each overridable through its environment variable.
    pub fn from_env() -> Result<Self, ToolError> {
        let read = |name: &str, default: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Ok(Self {
            base_url: parse_url(&read(DASHBOARD_URL_ENV, dashboard::BASE_URL))?,
            token_url: parse_url(&read(TOKEN_URL_ENV, dashboard::TOKEN_URL))?,
            client_id: read(CLIENT_ID_ENV, dashboard::CLIENT_ID),
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ToolError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ToolError::internal(format!("Dashboard URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Application ids are alphanumeric; anything else never reaches a dashboard URL.
fn check_application_id(application_id: &str) -> Result<(), ToolError> {
    let valid = !application_id.is_empty()
        && application_id.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(ToolError::invalid_params(format!(
            "Invalid application id '{}'",
            application_id
        )))
    }
}

fn parse_url(raw: &str) -> Result<Url, ToolError> {
    Url::parse(raw).map_err(|err| {
        ToolError::invalid_params(format!("Invalid URL '{}': {}", raw, err))
    })
}

/// Credentials obtained from the dashboard API with a stored bearer token.
pub struct DashboardCredentials {
    config: DashboardConfig,
    transport: Arc<dyn HttpTransport>,
    store: Arc<TokenStore>,
    applications: DashMap<String, Application>,
}

impl DashboardCredentials {
    pub fn new(
        config: DashboardConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            applications: DashMap::new(),
        }
    }

    async fn access_token(&self) -> Result<String, ToolError> {
        let state = self.store.snapshot().await;
        let Some(token) = state.access_token else {
            return Err(ToolError::credential("No dashboard access token stored")
                .with_hint("Authenticate first or start the server with --credentials"));
        };
        match state.expires_at {
            Some(expires_at) if expires_at <= Utc::now() => self.refresh(&token).await,
            _ => Ok(token),
        }
    }

    async fn refresh(&self, stale: &str) -> Result<String, ToolError> {
        let transport = self.transport.clone();
        let token_url = self.config.token_url.clone();
        let client_id = self.config.client_id.clone();
        self.store
            .refresh(stale, |refresh_token| async move {
                let form = serde_urlencoded::to_string([
                    ("client_id", client_id.as_str()),
                    ("refresh_token", refresh_token.as_str()),
                    ("grant_type", "refresh_token"),
                ])
                .map_err(|err| ToolError::internal(format!("Failed to encode form: {}", err)))?;

                let mut request = OutboundRequest::new(HttpMethod::Post, token_url);
                request.set_header("content-type", CONTENT_TYPE_FORM);
                request.body = Some(form);
                let response = transport.send(request).await?;
                if !response.is_success() {
                    return Err(ToolError::credential(format!(
                        "Failed to refresh token: HTTP {}",
                        response.status
                    ))
                    .with_hint("Authenticate again to obtain a new token"));
                }
                serde_json::from_str::<TokenGrant>(&response.body).map_err(|err| {
                    ToolError::credential(format!("Invalid token response: {}", err))
                })
            })
            .await
    }

    /// Sends one dashboard request, refreshing the token and retrying once on 401.
    async fn authorized(
        &self,
        method: HttpMethod,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<Value, ToolError> {
        let url = self.config.endpoint(segments)?;
        let path = url.path().to_string();
        let body = body.map(Value::to_string);

        let token = self.access_token().await?;
        let mut response = self
            .send_with_token(method, &url, body.clone(), &token)
            .await?;
        if response.status == 401 {
            tracing::info!(path = %path, "dashboard rejected access token, refreshing");
            let fresh = self.refresh(&token).await?;
            response = self.send_with_token(method, &url, body, &fresh).await?;
        }

        if !response.is_success() {
            return Err(ToolError::credential(format!(
                "Dashboard request {} {} failed with HTTP {}: {}",
                method,
                path,
                response.status,
                redact_text(&response.body)
            )));
        }
        serde_json::from_str(&response.body).map_err(|err| {
            ToolError::credential(format!("Invalid dashboard response for {}: {}", path, err))
        })
    }

    async fn send_with_token(
        &self,
        method: HttpMethod,
        url: &Url,
        body: Option<String>,
        token: &str,
    ) -> Result<HttpResponse, ToolError> {
        let mut request = OutboundRequest::new(method, url.clone());
        request.set_header("authorization", format!("Bearer {}", token));
        request.set_header("accept", CONTENT_TYPE_JSON);
        if body.is_some() {
            request.set_header("content-type", CONTENT_TYPE_JSON);
        }
        request.body = body;
        self.transport.send(request).await
    }
}

fn attribute<'a>(payload: &'a Value, name: &str) -> Option<&'a Value> {
    payload
        .pointer(&format!("/data/attributes/{}", name))
        .or_else(|| payload.get(name))
}

#[async_trait]
impl CredentialProvider for DashboardCredentials {
    async fn api_key(&self, application_id: &str) -> Result<String, ToolError> {
        check_application_id(application_id)?;
        if let Some(key) = self.store.snapshot().await.api_keys.get(application_id) {
            return Ok(key.clone());
        }

        let payload = json!({
            "acl": dashboard::REQUIRED_ACLS,
            "description": dashboard::API_KEY_DESCRIPTION,
        });
        let response = self
            .authorized(
                HttpMethod::Post,
                &["1", "applications", application_id, "api-keys"],
                Some(&payload),
            )
            .await?;
        let key = attribute(&response, "value")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::credential("Dashboard response did not contain an API key"))?
            .to_string();

        let app = application_id.to_string();
        let stored = key.clone();
        self.store
            .update(move |state| {
                state.api_keys.insert(app, stored);
            })
            .await?;
        tracing::info!(application_id, "created API key");
        Ok(key)
    }

    async fn application(&self, application_id: &str) -> Result<Application, ToolError> {
        check_application_id(application_id)?;
        if let Some(cached) = self.applications.get(application_id) {
            return Ok(cached.clone());
        }
        let response = self
            .authorized(
                HttpMethod::Get,
                &["1", "applications", application_id],
                None,
            )
            .await?;
        let application = Application {
            id: application_id.to_string(),
            log_region: attribute(&response, "log_region")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        };
        self.applications
            .insert(application_id.to_string(), application.clone());
        Ok(application)
    }
}
