use crate::constants::tools::APPLICATION_ID_ARG;
use crate::errors::ToolError;
use crate::services::credentials::CredentialProvider;
use crate::services::transport::OutboundRequest;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Request rewrite applied after credentials are attached and before the
/// request is sent. Receives the call's resolved parameters.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn apply(
        &self,
        request: OutboundRequest,
        params: &Map<String, Value>,
    ) -> Result<OutboundRequest, ToolError>;
}

/// Runs `chain` left to right, each step consuming the previous output.
pub async fn apply_chain(
    chain: &[Arc<dyn Middleware>],
    mut request: OutboundRequest,
    params: &Map<String, Value>,
) -> Result<OutboundRequest, ToolError> {
    for middleware in chain {
        request = middleware.apply(request, params).await?;
    }
    Ok(request)
}

/// Rewrites `name=a,b` into `name=a&name=b`.
#[derive(Debug, Clone)]
pub struct ExplodeQueryParam {
    name: String,
}

impl ExplodeQueryParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Middleware for ExplodeQueryParam {
    async fn apply(
        &self,
        mut request: OutboundRequest,
        _params: &Map<String, Value>,
    ) -> Result<OutboundRequest, ToolError> {
        let pairs: Vec<(String, String)> = request
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if !pairs.iter().any(|(k, v)| k == &self.name && v.contains(',')) {
            return Ok(request);
        }

        let mut exploded = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            if key == self.name {
                for part in value.split(',').filter(|p| !p.is_empty()) {
                    exploded.push((key.clone(), part.to_string()));
                }
            } else {
                exploded.push((key, value));
            }
        }
        request
            .url
            .query_pairs_mut()
            .clear()
            .extend_pairs(exploded);
        Ok(request)
    }
}

static REGIONAL_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data\.([a-z0-9-]+)\.algolia\.com$").expect("regional host regex"));

/// Points `data.<region>.algolia.com` at the region the application lives in.
pub struct RegionCorrection {
    credentials: Arc<dyn CredentialProvider>,
}

impl RegionCorrection {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { credentials }
    }
}

fn region_for(log_region: &str) -> &'static str {
    if log_region.eq_ignore_ascii_case("de") {
        "eu"
    } else {
        "us"
    }
}

#[async_trait]
impl Middleware for RegionCorrection {
    async fn apply(
        &self,
        mut request: OutboundRequest,
        params: &Map<String, Value>,
    ) -> Result<OutboundRequest, ToolError> {
        let Some(current) = request
            .url
            .host_str()
            .and_then(|host| REGIONAL_HOST.captures(host))
            .map(|caps| caps[1].to_string())
        else {
            return Ok(request);
        };
        let Some(application_id) = params.get(APPLICATION_ID_ARG).and_then(|v| v.as_str()) else {
            return Ok(request);
        };

        let application = self.credentials.application(application_id).await?;
        let Some(log_region) = application.log_region.as_deref() else {
            return Ok(request);
        };
        let expected = region_for(log_region);
        if current != expected {
            let host = format!("data.{}.algolia.com", expected);
            tracing::warn!(
                application_id,
                from = %current,
                to = expected,
                "rewriting ingestion host to the application's region"
            );
            request.url.set_host(Some(&host)).map_err(|err| {
                ToolError::internal(format!("Failed to set host {}: {}", host, err))
            })?;
        }
        Ok(request)
    }
}
