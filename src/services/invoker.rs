use crate::constants::http::{client_identity, CLIENT_IDENTITY_HEADER, CONTENT_TYPE_JSON};
use crate::constants::security::{APPLICATION_ID_SCHEME, API_KEY_SCHEME, SUPPORTED_KIND};
use crate::constants::tools::{APPLICATION_ID_ARG, REQUEST_BODY_ARG};
use crate::errors::ToolError;
use crate::openapi::{HttpMethod, SchemeLocation, SecurityScheme};
use crate::services::credentials::CredentialProvider;
use crate::services::middleware::{apply_chain, Middleware};
use crate::services::tool_handler::{ToolHandler, ToolOutput};
use crate::services::transport::{HttpTransport, OutboundRequest};
use crate::utils::redact::redact_url;
use crate::utils::template::substitute;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use url::Url;

/// Everything the invoker needs to know about one operation.
#[derive(Debug, Clone)]
pub struct OperationBinding {
    pub operation_id: String,
    pub method: HttpMethod,
    /// Server URL template, e.g. `https://{applicationId}.algolia.net`.
    pub server_url: String,
    /// Path template, e.g. `/1/indexes/{indexName}/settings`.
    pub path: String,
    pub query_params: Vec<String>,
    pub security: Vec<String>,
    pub schemes: Arc<BTreeMap<String, SecurityScheme>>,
}

/// Argument name a security requirement is read from.
pub fn security_input_name(scheme_id: &str) -> &str {
    if scheme_id == APPLICATION_ID_SCHEME {
        APPLICATION_ID_ARG
    } else {
        scheme_id
    }
}

/// Turns validated call arguments into one HTTP request and returns the
/// response body verbatim.
pub struct RequestInvoker {
    binding: OperationBinding,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn HttpTransport>,
    middlewares: Vec<Arc<dyn Middleware>>,
    default_application_id: Option<String>,
}

impl RequestInvoker {
    pub fn new(
        binding: OperationBinding,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            binding,
            credentials,
            transport,
            middlewares: Vec::new(),
            default_application_id: None,
        }
    }

    pub fn with_middlewares(mut self, middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        self.middlewares = middlewares;
        self
    }

    pub fn with_default_application_id(mut self, application_id: Option<String>) -> Self {
        self.default_application_id = application_id;
        self
    }

    pub fn binding(&self) -> &OperationBinding {
        &self.binding
    }

    pub async fn invoke(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let binding = &self.binding;
        let body_arg = args.get(REQUEST_BODY_ARG).filter(|v| !v.is_null());
        if binding.method == HttpMethod::Get && body_arg.is_some() {
            return Err(ToolError::invalid_params(format!(
                "{} is a GET operation and does not accept a {}",
                binding.operation_id, REQUEST_BODY_ARG
            )));
        }

        let mut params = args.clone();
        if !params.contains_key(APPLICATION_ID_ARG) {
            if let Some(default) = &self.default_application_id {
                params.insert(APPLICATION_ID_ARG.to_string(), Value::String(default.clone()));
            }
        }

        let mut url = self.build_url(&params)?;
        let query: Vec<(String, String)> = binding
            .query_params
            .iter()
            .filter_map(|name| {
                params
                    .get(name)
                    .filter(|v| !v.is_null())
                    .map(|v| (name.clone(), query_value(v)))
            })
            .collect();
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut request = OutboundRequest::new(binding.method, url);
        if let Some(body) = body_arg {
            request.body = Some(serialize_body(body)?);
            request.set_header("content-type", CONTENT_TYPE_JSON);
        }

        self.attach_security(&mut request, &params).await?;
        request.set_header(CLIENT_IDENTITY_HEADER, client_identity());

        let request = apply_chain(&self.middlewares, request, &params).await?;
        let method = request.method;
        let shown_url = redact_url(&request.url);
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            tracing::warn!(
                operation = %binding.operation_id,
                %method,
                url = %shown_url,
                status = response.status,
                "upstream returned a non-success status"
            );
        }
        Ok(response.body)
    }

    fn build_url(&self, params: &Map<String, Value>) -> Result<Url, ToolError> {
        let base = substitute(&self.binding.server_url, |name| {
            params
                .get(name)
                .filter(|v| !v.is_null())
                .map(|v| percent_encode_path_param(&plain_value(v)))
        })?;
        let path = substitute(&self.binding.path, |name| {
            params
                .get(name)
                .filter(|v| !v.is_null())
                .map(|v| percent_encode_path_param(&plain_value(v)))
        })?;

        let mut url = Url::parse(&base).map_err(|err| {
            ToolError::invalid_params(format!("Invalid server URL '{}': {}", base, err))
        })?;
        let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        Ok(url)
    }

    async fn attach_security(
        &self,
        request: &mut OutboundRequest,
        params: &Map<String, Value>,
    ) -> Result<(), ToolError> {
        for key in &self.binding.security {
            let scheme = self.binding.schemes.get(key).ok_or_else(|| {
                ToolError::security_config(format!("Unknown security scheme '{}'", key))
            })?;
            if scheme.kind != SUPPORTED_KIND {
                return Err(ToolError::security_config(format!(
                    "Unsupported security scheme type '{}' for '{}'",
                    scheme.kind, key
                )));
            }

            let value = if key == API_KEY_SCHEME {
                let application_id = params
                    .get(APPLICATION_ID_ARG)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        ToolError::security_config(format!(
                            "{} is required to obtain an API key",
                            APPLICATION_ID_ARG
                        ))
                    })?;
                self.credentials.api_key(application_id).await?
            } else {
                params
                    .get(security_input_name(key))
                    .filter(|v| !v.is_null())
                    .map(plain_value)
                    .ok_or_else(|| {
                        ToolError::security_config(format!(
                            "Missing value for security scheme '{}'",
                            key
                        ))
                    })?
            };

            let name = scheme.name.as_deref().ok_or_else(|| {
                ToolError::security_config(format!("Security scheme '{}' has no name", key))
            })?;
            match scheme.location {
                Some(SchemeLocation::Header) => request.set_header(name, value),
                Some(SchemeLocation::Query) => {
                    request.url.query_pairs_mut().append_pair(name, &value);
                }
                _ => {
                    return Err(ToolError::security_config(format!(
                        "Security scheme '{}' must be sent in a header or the query string",
                        key
                    )))
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ToolHandler for RequestInvoker {
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError> {
        self.invoke(&args).await.map(ToolOutput::Text)
    }
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(plain_value).collect::<Vec<_>>().join(","),
        other => plain_value(other),
    }
}

fn serialize_body(body: &Value) -> Result<String, ToolError> {
    if let Value::String(raw) = body {
        if serde_json::from_str::<Value>(raw).is_ok() {
            return Ok(raw.clone());
        }
    }
    serde_json::to_string(body)
        .map_err(|err| ToolError::internal(format!("Failed to encode request body: {}", err)))
}

fn percent_encode_path_param(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => encoded.push(c),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).as_bytes() {
                    let _ = write!(&mut encoded, "%{byte:02X}");
                }
            }
        }
    }
    encoded
}
