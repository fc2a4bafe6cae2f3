use crate::errors::ToolError;
use crate::openapi::HttpMethod;
use crate::utils::redact::{redact_headers, redact_url};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Instant;
use url::Url;

/// A fully built request, handed through the middleware chain to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: Url,
    /// Lowercased header names.
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl OutboundRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one request. Any response, whatever its status, is `Ok`; only a
/// request that produced no response is an error.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, ToolError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ToolError> {
        let client = Client::builder()
            .redirect(same_host_redirects())
            .build()
            .map_err(|err| ToolError::internal(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, ToolError> {
        let headers = headers_to_headermap(&request.headers)?;
        tracing::debug!(
            method = %request.method,
            url = %redact_url(&request.url),
            headers = ?redact_headers(&request.headers),
            "sending request"
        );

        let started = Instant::now();
        let request_url = request.url.clone();
        let mut builder = self
            .client
            .request(request.method.into(), request.url.clone())
            .headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let body = String::from_utf8(bytes.to_vec()).map_err(|err| {
            ToolError::network(format!(
                "Response body from {} is not valid UTF-8: {}",
                redact_url(&request_url),
                err.utf8_error()
            ))
        })?;

        tracing::debug!(
            status,
            bytes = body.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "response received"
        );
        Ok(HttpResponse { status, body })
    }
}

const MAX_REDIRECTS: usize = 10;

/// Follows redirects only while they stay on the original host; a redirect
/// elsewhere is handed back as the response so credential headers never leave.
fn same_host_redirects() -> Policy {
    Policy::custom(|attempt| {
        let origin = attempt.previous().first().and_then(|url| url.host_str());
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if attempt.url().host_str() != origin {
            tracing::warn!(to = %redact_url(attempt.url()), "not following cross-host redirect");
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ToolError {
    if err.is_builder() {
        return ToolError::invalid_params(format!("Invalid request: {}", err));
    }
    ToolError::network(format!("HTTP request failed: {}", err))
}

fn headers_to_headermap(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ToolError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ToolError::invalid_params(format!("Invalid header name '{}'", key)))?;
        let val = HeaderValue::from_str(value)
            .map_err(|_| ToolError::invalid_params(format!("Invalid value for header '{}'", key)))?;
        map.insert(name, val);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_names_are_case_insensitive() {
        let url = Url::parse("https://example.com").unwrap();
        let mut req = OutboundRequest::new(HttpMethod::Get, url);
        req.set_header("X-Algolia-Agent", "algolia-mcp");
        assert_eq!(req.header("x-algolia-agent"), Some("algolia-mcp"));
        assert!(req.headers.contains_key("x-algolia-agent"));
    }

    #[test]
    fn rejects_header_values_with_newlines() {
        let mut headers = BTreeMap::new();
        headers.insert("x-test".to_string(), "a\nb".to_string());
        let err = headers_to_headermap(&headers).unwrap_err();
        assert!(err.message.contains("x-test"));
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse { status: 204, body: String::new() }.is_success());
        assert!(!HttpResponse { status: 404, body: String::new() }.is_success());
    }
}
