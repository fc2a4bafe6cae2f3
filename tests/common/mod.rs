#![allow(dead_code)]

use algolia_mcp::errors::ToolError;
use algolia_mcp::services::credentials::{Application, CredentialProvider};
use algolia_mcp::services::transport::{HttpResponse, HttpTransport, OutboundRequest};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn restore_env(key: &str, previous: Option<String>) {
    match previous {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

/// Records every request and answers from a queue, then with a fallback.
pub struct StubTransport {
    requests: StdMutex<Vec<OutboundRequest>>,
    queued: StdMutex<VecDeque<Result<HttpResponse, ToolError>>>,
    fallback: HttpResponse,
}

impl StubTransport {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            requests: StdMutex::new(Vec::new()),
            queued: StdMutex::new(VecDeque::new()),
            fallback: HttpResponse {
                status,
                body: body.to_string(),
            },
        }
    }

    pub fn ok(body: &str) -> Self {
        Self::new(200, body)
    }

    pub fn push(&self, status: u16, body: &str) {
        self.queued.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_error(&self, err: ToolError) {
        self.queued.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> OutboundRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("at least one request")
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, ToolError> {
        self.requests.lock().unwrap().push(request);
        match self.queued.lock().unwrap().pop_front() {
            Some(next) => next,
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Hands out `key-<applicationId>` and a fixed region.
pub struct StubCredentials {
    pub log_region: Option<String>,
    pub api_key_calls: AtomicUsize,
}

impl StubCredentials {
    pub fn new() -> Self {
        Self {
            log_region: None,
            api_key_calls: AtomicUsize::new(0),
        }
    }

    pub fn in_region(region: &str) -> Self {
        Self {
            log_region: Some(region.to_string()),
            api_key_calls: AtomicUsize::new(0),
        }
    }

    pub fn api_key_calls(&self) -> usize {
        self.api_key_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StubCredentials {
    async fn api_key(&self, application_id: &str) -> Result<String, ToolError> {
        self.api_key_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("key-{}", application_id))
    }

    async fn application(&self, application_id: &str) -> Result<Application, ToolError> {
        Ok(Application {
            id: application_id.to_string(),
            log_region: self.log_region.clone(),
        })
    }
}

fn security_schemes() -> Value {
    json!({
        "appId": {"type": "apiKey", "in": "header", "name": "x-algolia-application-id", "description": "Your Algolia application ID."},
        "apiKey": {"type": "apiKey", "in": "header", "name": "x-algolia-api-key", "description": "Your Algolia API key."}
    })
}

/// A trimmed-down search API description.
pub fn search_document() -> Value {
    json!({
        "openapi": "3.0.2",
        "info": {"title": "Search API", "version": "1.0.0"},
        "servers": [{"url": "https://{applicationId}.algolia.net"}],
        "security": [{"appId": [], "apiKey": []}],
        "components": {
            "securitySchemes": security_schemes(),
            "parameters": {
                "IndexName": {"in": "path", "name": "indexName", "required": true, "description": "Name of the index.", "schema": {"type": "string"}}
            },
            "schemas": {
                "SearchParams": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "hitsPerPage": {"type": "integer"},
                        "facetFilters": {"$ref": "#/components/schemas/FacetFilters"}
                    }
                },
                "FacetFilters": {
                    "oneOf": [
                        {"type": "string"},
                        {"type": "array", "items": {"$ref": "#/components/schemas/FacetFilters"}}
                    ]
                }
            }
        },
        "paths": {
            "/1/indexes/{indexName}/settings": {
                "get": {
                    "operationId": "getSettings",
                    "summary": "Retrieve index settings",
                    "parameters": [
                        {"$ref": "#/components/parameters/IndexName"},
                        {"in": "query", "name": "getVersion", "schema": {"type": "integer"}}
                    ]
                },
                "put": {
                    "operationId": "setSettings",
                    "summary": "Update index settings",
                    "parameters": [
                        {"$ref": "#/components/parameters/IndexName"},
                        {"in": "query", "name": "forwardToReplicas", "schema": {"type": "boolean"}}
                    ],
                    "requestBody": {"required": true, "content": {"application/json": {"schema": {"type": "object"}}}}
                }
            },
            "/1/indexes/{indexName}/query": {
                "post": {
                    "operationId": "searchSingleIndex",
                    "summary": "Search an index",
                    "x-use-read-transporter": true,
                    "parameters": [{"$ref": "#/components/parameters/IndexName"}],
                    "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/SearchParams"}}}}
                }
            },
            "/1/indexes/{indexName}/browse": {
                "post": {
                    "operationId": "browse",
                    "x-use-read-transporter": true,
                    "parameters": [{"$ref": "#/components/parameters/IndexName"}]
                }
            },
            "/1/indexes/{indexName}/records": {
                "get": {
                    "operationId": "exportRecords",
                    "description": "Stream records as NDJSON",
                    "parameters": [{"$ref": "#/components/parameters/IndexName"}]
                }
            },
            "/{path}": {
                "get": {"operationId": "customGet", "parameters": [{"in": "path", "name": "path", "required": true, "schema": {"type": "string"}}]},
                "post": {"operationId": "customPost", "parameters": [{"in": "path", "name": "path", "required": true, "schema": {"type": "string"}}]}
            },
            "/1/helpers/waitForTask": {
                "get": {"operationId": "waitForTask", "x-helper": true}
            }
        }
    })
}

/// Usage API with a comma separated `name` query parameter.
pub fn usage_document() -> Value {
    json!({
        "info": {"title": "Usage API"},
        "servers": [{"url": "https://usage.algolia.com"}],
        "security": [{"appId": [], "apiKey": []}],
        "components": {"securitySchemes": security_schemes()},
        "paths": {
            "/2/metrics/{metric}": {
                "get": {
                    "operationId": "getUsage",
                    "parameters": [
                        {"in": "path", "name": "metric", "required": true, "schema": {"type": "string"}},
                        {"in": "query", "name": "name", "schema": {"type": "array", "items": {"type": "string"}}}
                    ]
                }
            }
        }
    })
}

/// Ingestion API on a regional host chosen by a server variable.
pub fn ingestion_document() -> Value {
    json!({
        "info": {"title": "Ingestion API"},
        "servers": [{
            "url": "https://data.{region}.algolia.com",
            "variables": {"region": {"default": "us", "enum": ["us", "eu"], "description": "Region of the application."}}
        }],
        "security": [{"appId": [], "apiKey": []}],
        "components": {"securitySchemes": security_schemes()},
        "paths": {
            "/1/sources": {
                "get": {"operationId": "listSources"}
            }
        }
    })
}
