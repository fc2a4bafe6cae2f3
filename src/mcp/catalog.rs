use crate::constants::security::API_KEY_SCHEME;
use crate::constants::tools::{APPLICATION_ID_ARG, REQUEST_BODY_ARG};
use crate::errors::ToolError;
use crate::mcp::dispatcher::ProtocolDispatcher;
use crate::mcp::filter::ToolFilter;
use crate::mcp::protocol::{ToolAnnotations, ToolDescriptor};
use crate::openapi::{hoist_definitions, ApiDescription, OperationDescriptor, ParameterLocation};
use crate::services::credentials::CredentialProvider;
use crate::services::invoker::{security_input_name, OperationBinding, RequestInvoker};
use crate::services::middleware::Middleware;
use crate::services::transport::HttpTransport;
use crate::utils::template::placeholders;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// One surviving operation: what is advertised plus how to call it.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub descriptor: ToolDescriptor,
    pub binding: OperationBinding,
}

/// Turns API descriptions into registered tools.
pub struct ToolCatalogBuilder {
    filter: ToolFilter,
    credentials: Arc<dyn CredentialProvider>,
    transport: Arc<dyn HttpTransport>,
    default_application_id: Option<String>,
}

impl ToolCatalogBuilder {
    pub fn new(
        filter: ToolFilter,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            filter,
            credentials,
            transport,
            default_application_id: None,
        }
    }

    /// With a fixed application id, `applicationId` is advertised but optional.
    pub fn with_default_application_id(mut self, application_id: Option<String>) -> Self {
        self.default_application_id = application_id;
        self
    }

    /// Registers every surviving operation of `description`; returns how many.
    pub fn register(
        &self,
        dispatcher: &mut ProtocolDispatcher,
        description: &ApiDescription,
        middlewares: &[Arc<dyn Middleware>],
    ) -> Result<usize, ToolError> {
        let entries = self.entries(description)?;
        let count = entries.len();
        for entry in entries {
            let invoker = RequestInvoker::new(
                entry.binding,
                self.credentials.clone(),
                self.transport.clone(),
            )
            .with_middlewares(middlewares.to_vec())
            .with_default_application_id(self.default_application_id.clone());
            dispatcher.register(entry.descriptor, Arc::new(invoker))?;
        }
        Ok(count)
    }

    /// Catalog entries for `description` in path then method order.
    pub fn entries(&self, description: &ApiDescription) -> Result<Vec<CatalogEntry>, ToolError> {
        let mut out = Vec::new();
        for op in &description.operations {
            if op.is_helper {
                continue;
            }
            if !self.filter.is_allowed(&op.operation_id) {
                tracing::debug!(tool = %op.operation_id, "tool filtered out");
                continue;
            }
            out.push(CatalogEntry {
                descriptor: self.descriptor(description, op)?,
                binding: binding(description, op),
            });
        }
        Ok(out)
    }

    fn descriptor(
        &self,
        description: &ApiDescription,
        op: &OperationDescriptor,
    ) -> Result<ToolDescriptor, ToolError> {
        let read_only = op.is_read_only();
        Ok(ToolDescriptor {
            name: op.operation_id.clone(),
            description: op.summary.clone().or_else(|| op.description.clone()),
            input_schema: self.input_schema(description, op)?,
            annotations: Some(ToolAnnotations {
                read_only_hint: read_only,
                destructive_hint: !read_only,
            }),
        })
    }

    pub fn input_schema(
        &self,
        description: &ApiDescription,
        op: &OperationDescriptor,
    ) -> Result<Value, ToolError> {
        let mut properties = Map::new();
        let mut required: Vec<String> = Vec::new();

        for key in &op.security {
            if key == API_KEY_SCHEME {
                continue;
            }
            let Some(scheme) = description.security_schemes.get(key) else {
                continue;
            };
            let name = security_input_name(key).to_string();
            let mut schema = json!({"type": "string"});
            if let Some(text) = &scheme.description {
                schema["description"] = Value::String(text.clone());
            }
            properties.entry(name.clone()).or_insert(schema);
            required.push(name);
        }

        let server = &description.server;
        for (name, variable) in &server.variables {
            let mut schema = json!({"type": "string"});
            if let Some(text) = &variable.description {
                schema["description"] = Value::String(text.clone());
            }
            if !variable.allowed.is_empty() {
                schema["enum"] = json!(variable.allowed);
            }
            properties.entry(name.clone()).or_insert(schema);
            required.push(name.clone());
        }
        for name in placeholders(&server.url) {
            properties
                .entry(name.clone())
                .or_insert_with(|| json!({"type": "string"}));
            required.push(name);
        }

        for param in &op.parameters {
            if param.location == ParameterLocation::Unsupported {
                tracing::debug!(
                    tool = %op.operation_id,
                    parameter = %param.name,
                    "skipping parameter outside path and query"
                );
                continue;
            }
            let mut schema = match &param.schema {
                Value::Null => json!({}),
                other => other.clone(),
            };
            if let (Some(text), Some(obj)) = (&param.description, schema.as_object_mut()) {
                obj.entry("description")
                    .or_insert_with(|| Value::String(text.clone()));
            }
            properties.insert(param.name.clone(), schema);
            if param.required {
                required.push(param.name.clone());
            }
        }

        if let Some(body) = &op.request_body {
            if let Some(schema) = body.json_schema() {
                properties.insert(REQUEST_BODY_ARG.to_string(), schema.clone());
                if body.required {
                    required.push(REQUEST_BODY_ARG.to_string());
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        required.retain(|name| seen.insert(name.clone()));
        if self.default_application_id.is_some() {
            required.retain(|name| name != APPLICATION_ID_ARG);
        }

        let properties = Value::Object(properties);
        let definitions = hoist_definitions(&properties, &description.definitions)?;

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), properties);
        if !required.is_empty() {
            schema.insert("required".to_string(), json!(required));
        }
        if !definitions.is_empty() {
            schema.insert("definitions".to_string(), Value::Object(definitions));
        }
        Ok(Value::Object(schema))
    }
}

fn binding(description: &ApiDescription, op: &OperationDescriptor) -> OperationBinding {
    OperationBinding {
        operation_id: op.operation_id.clone(),
        method: op.method,
        server_url: description.server.url.clone(),
        path: op.path.clone(),
        query_params: op
            .parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Query)
            .map(|p| p.name.clone())
            .collect(),
        security: op.security.clone(),
        schemes: description.security_schemes.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credentials::StaticCredentials;
    use crate::services::transport::{HttpResponse, OutboundRequest};
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct NoTransport;

    #[async_trait]
    impl HttpTransport for NoTransport {
        async fn send(&self, _request: OutboundRequest) -> Result<HttpResponse, ToolError> {
            Err(ToolError::network("offline"))
        }
    }

    fn description() -> ApiDescription {
        ApiDescription::from_document(&json!({
            "info": {"title": "Search API"},
            "servers": [{"url": "https://{applicationId}.algolia.net"}],
            "security": [{"appId": [], "apiKey": []}],
            "components": {
                "securitySchemes": {
                    "appId": {"type": "apiKey", "in": "header", "name": "x-algolia-application-id", "description": "Your Algolia application ID."},
                    "apiKey": {"type": "apiKey", "in": "header", "name": "x-algolia-api-key"}
                },
                "schemas": {
                    "Filter": {"type": "object", "properties": {"or": {"type": "array", "items": {"$ref": "#/components/schemas/Filter"}}}}
                }
            },
            "paths": {
                "/1/indexes/{indexName}/settings": {
                    "get": {
                        "operationId": "getSettings",
                        "summary": "Retrieve index settings",
                        "parameters": [{"in": "path", "name": "indexName", "required": true, "description": "Index name.", "schema": {"type": "string"}}]
                    }
                },
                "/1/indexes/{indexName}/query": {
                    "post": {
                        "operationId": "searchSingleIndex",
                        "description": "Search one index",
                        "parameters": [
                            {"in": "path", "name": "indexName", "required": true, "schema": {"type": "string"}},
                            {"in": "header", "name": "x-trace", "schema": {"type": "string"}}
                        ],
                        "requestBody": {"required": true, "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Filter"}}}}
                    }
                },
                "/1/indexes/{indexName}/browse": {
                    "post": {"operationId": "browse", "x-use-read-transporter": true,
                             "parameters": [{"in": "path", "name": "indexName", "required": true, "schema": {"type": "string"}}]}
                },
                "/1/{path}": {
                    "get": {"operationId": "customGet"},
                    "delete": {"operationId": "helperCleanup", "x-helper": true}
                }
            }
        }))
        .unwrap()
    }

    fn builder(filter: ToolFilter) -> ToolCatalogBuilder {
        ToolCatalogBuilder::new(
            filter,
            Arc::new(StaticCredentials::new("APP", "key")),
            Arc::new(NoTransport),
        )
    }

    fn names(entries: &[CatalogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.descriptor.name.as_str()).collect()
    }

    #[test]
    fn skips_helpers_and_blocked_operations() {
        let entries = builder(ToolFilter::default()).entries(&description()).unwrap();
        assert_eq!(names(&entries), vec!["getSettings", "searchSingleIndex", "browse"]);
    }

    #[test]
    fn allow_list_narrows_catalog() {
        let allowed: HashSet<String> = ["getSettings".to_string(), "customGet".to_string()].into();
        let entries = builder(ToolFilter::new(Some(allowed), None))
            .entries(&description())
            .unwrap();
        assert_eq!(names(&entries), vec!["getSettings"]);
    }

    #[test]
    fn api_key_is_never_advertised() {
        let entries = builder(ToolFilter::default()).entries(&description()).unwrap();
        for entry in &entries {
            let props = entry.descriptor.input_schema["properties"].as_object().unwrap();
            assert!(!props.contains_key("apiKey"));
            assert!(props.contains_key("applicationId"));
        }
    }

    #[test]
    fn schema_combines_security_server_parameters_and_body() {
        let entries = builder(ToolFilter::default()).entries(&description()).unwrap();
        let schema = &entries[1].descriptor.input_schema;
        assert_eq!(
            schema["required"],
            json!(["applicationId", "indexName", "requestBody"])
        );
        assert_eq!(
            schema["properties"]["applicationId"]["description"],
            "Your Algolia application ID."
        );
        assert!(schema["properties"].get("x-trace").is_none());
        assert_eq!(
            schema["properties"]["requestBody"]["properties"]["or"]["items"],
            json!({"$ref": "#/definitions/Filter"})
        );
        assert!(schema["definitions"]["Filter"].is_object());
        assert_eq!(
            entries[1].descriptor.description.as_deref(),
            Some("Search one index")
        );
    }

    #[test]
    fn parameter_description_is_carried() {
        let entries = builder(ToolFilter::default()).entries(&description()).unwrap();
        let schema = &entries[0].descriptor.input_schema;
        assert_eq!(schema["properties"]["indexName"]["description"], "Index name.");
        assert_eq!(
            entries[0].descriptor.description.as_deref(),
            Some("Retrieve index settings")
        );
    }

    #[test]
    fn annotations_follow_read_path() {
        let entries = builder(ToolFilter::default()).entries(&description()).unwrap();
        let hints: Vec<(bool, bool)> = entries
            .iter()
            .map(|e| {
                let a = e.descriptor.annotations.as_ref().unwrap();
                (a.read_only_hint, a.destructive_hint)
            })
            .collect();
        assert_eq!(hints, vec![(true, false), (false, true), (true, false)]);
    }

    #[test]
    fn default_application_id_makes_it_optional() {
        let entries = builder(ToolFilter::default())
            .with_default_application_id(Some("APP".to_string()))
            .entries(&description())
            .unwrap();
        let schema = &entries[0].descriptor.input_schema;
        assert_eq!(schema["required"], json!(["indexName"]));
        assert!(schema["properties"]["applicationId"].is_object());
    }

    #[test]
    fn binding_keeps_query_parameters_and_security() {
        let entries = builder(ToolFilter::default()).entries(&description()).unwrap();
        let binding = &entries[1].binding;
        assert!(binding.query_params.is_empty());
        assert_eq!(binding.security, vec!["appId", "apiKey"]);
        assert_eq!(binding.server_url, "https://{applicationId}.algolia.net");
    }

    #[test]
    fn duplicate_names_across_descriptions_are_fatal() {
        let builder = builder(ToolFilter::default());
        let mut dispatcher = ProtocolDispatcher::new();
        builder.register(&mut dispatcher, &description(), &[]).unwrap();
        let err = builder
            .register(&mut dispatcher, &description(), &[])
            .unwrap_err();
        assert_eq!(err.kind, crate::errors::ToolErrorKind::DuplicateTool);
        assert_eq!(err.message, "Tool with name getSettings already exists");
    }
}
