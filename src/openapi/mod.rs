//! Subset of the OpenAPI 3 description model consumed by the tool catalog.
//!
//! Only the constructs the catalog needs are modelled: path and query
//! parameters, JSON request bodies, API-key security schemes and server URL
//! templates. Every `$ref` is resolved before the typed model is built, so the
//! rest of the crate never sees a pointer into the raw document.

pub mod loader;
pub mod resolver;

use crate::errors::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use resolver::{collect_refs, hoist_definitions, resolve_refs, RefMode, SchemaResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "patch" => Some(HttpMethod::Patch),
            "delete" => Some(HttpMethod::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MediaType {
    #[serde(default)]
    schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    content: BTreeMap<String, MediaType>,
}

impl RequestBody {
    /// Schema of the `application/json` media type, if the body declares one.
    pub fn json_schema(&self) -> Option<&Value> {
        self.content
            .get(crate::constants::http::CONTENT_TYPE_JSON)
            .map(|media| &media.schema)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeLocation {
    Header,
    Query,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "in", default)]
    pub location: Option<SchemeLocation>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerVariable {
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "enum", default)]
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(default)]
    pub variables: BTreeMap<String, ServerVariable>,
}

/// One security requirement object: scheme id -> scopes.
pub type SecurityRequirement = Map<String, Value>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    operation_id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Vec<Parameter>,
    #[serde(default)]
    request_body: Option<RequestBody>,
    #[serde(default)]
    security: Option<Vec<SecurityRequirement>>,
    #[serde(rename = "x-helper", default)]
    helper: bool,
    #[serde(rename = "x-use-read-transporter", default)]
    use_read_transporter: bool,
}

/// One HTTP endpoint + method from a description, the source of one tool.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub path: String,
    pub method: HttpMethod,
    pub operation_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    /// Union of the description-level and operation-level requirement keys.
    pub security: Vec<String>,
    pub is_helper: bool,
    pub use_read_transporter: bool,
}

impl OperationDescriptor {
    pub fn is_read_only(&self) -> bool {
        self.method == HttpMethod::Get || self.use_read_transporter
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComponents {
    #[serde(default)]
    security_schemes: BTreeMap<String, SecurityScheme>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDescription {
    #[serde(default)]
    info: RawInfo,
    #[serde(default)]
    paths: Map<String, Value>,
    #[serde(default)]
    servers: Vec<Server>,
    #[serde(default)]
    security: Vec<SecurityRequirement>,
    #[serde(default)]
    components: RawComponents,
    #[serde(default)]
    definitions: Map<String, Value>,
}

/// A fully resolved API description.
#[derive(Debug, Clone)]
pub struct ApiDescription {
    pub title: String,
    pub server: Server,
    pub operations: Vec<OperationDescriptor>,
    pub security_schemes: Arc<BTreeMap<String, SecurityScheme>>,
    /// Fragments hoisted by the resolver; every remaining `$ref` points here.
    pub definitions: Map<String, Value>,
}

impl ApiDescription {
    /// Resolves every `$ref` in `document` and builds the typed model.
    pub fn from_document(document: &Value) -> Result<Self, ToolError> {
        let resolved = resolve_refs(document)?;
        let raw: RawDescription = serde_json::from_value(resolved).map_err(|err| {
            ToolError::spec_malformed(format!("Invalid API description: {}", err))
        })?;

        let title = raw.info.title;
        let server = raw.servers.into_iter().next().ok_or_else(|| {
            ToolError::spec_malformed(format!("API description '{}' declares no server", title))
        })?;

        let mut operations = Vec::new();
        for (path, item) in raw.paths.iter() {
            let Some(methods) = item.as_object() else {
                return Err(ToolError::spec_malformed(format!(
                    "Path item {} must be an object",
                    path
                )));
            };
            for (key, value) in methods.iter() {
                let Some(method) = HttpMethod::from_key(key) else {
                    continue;
                };
                let op: RawOperation = serde_json::from_value(value.clone()).map_err(|err| {
                    ToolError::spec_malformed(format!(
                        "Invalid operation {} {}: {}",
                        method, path, err
                    ))
                })?;
                let security = union_security_keys(&raw.security, op.security.as_deref());
                operations.push(OperationDescriptor {
                    path: path.clone(),
                    method,
                    operation_id: op.operation_id,
                    summary: op.summary,
                    description: op.description,
                    parameters: op.parameters,
                    request_body: op.request_body,
                    security,
                    is_helper: op.helper,
                    use_read_transporter: op.use_read_transporter,
                });
            }
        }

        Ok(Self {
            title,
            server,
            operations,
            security_schemes: Arc::new(raw.components.security_schemes),
            definitions: raw.definitions,
        })
    }

    /// Operation ids a caller could ever see, helpers excluded.
    pub fn operation_ids(&self) -> Vec<&str> {
        self.operations
            .iter()
            .filter(|op| !op.is_helper)
            .map(|op| op.operation_id.as_str())
            .collect()
    }
}

fn union_security_keys(
    global: &[SecurityRequirement],
    operation: Option<&[SecurityRequirement]>,
) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for requirement in global.iter().chain(operation.unwrap_or_default()) {
        for key in requirement.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }
    keys
}
