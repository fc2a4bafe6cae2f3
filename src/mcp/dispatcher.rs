use crate::constants::tools::REQUEST_BODY_ARG;
use crate::errors::{McpError, ToolError};
use crate::mcp::protocol::{CallToolResult, ToolDescriptor};
use crate::services::tool_handler::{ToolHandler, ToolOutput};
use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

const MAX_REPORTED_ERRORS: usize = 20;

struct RegisteredTool {
    descriptor: ToolDescriptor,
    validator: JSONSchema,
    properties: HashSet<String>,
    handler: Arc<dyn ToolHandler>,
}

/// Tool registry behind `tools/list` and `tools/call`.
pub struct ProtocolDispatcher {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
    list_changed: broadcast::Sender<()>,
}

impl Default for ProtocolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolDispatcher {
    pub fn new() -> Self {
        let (list_changed, _) = broadcast::channel(16);
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            list_changed,
        }
    }

    /// Receives one message per catalog change.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.list_changed.subscribe()
    }

    /// Compiles the tool's input schema and adds it to the catalog.
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(ToolError::duplicate_tool(&descriptor.name));
        }
        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&descriptor.input_schema)
            .map_err(|err| {
                ToolError::spec_malformed(format!(
                    "Invalid input schema for tool {}: {}",
                    descriptor.name, err
                ))
            })?;
        let properties = descriptor
            .input_schema
            .get("properties")
            .and_then(|v| v.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();

        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            validator,
            properties,
            handler,
        });
        // No receivers before the server starts; that is fine.
        let _ = self.list_changed.send(());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tools in registration order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, McpError> {
        let Some(tool) = self.index.get(name).map(|&i| &self.tools[i]) else {
            tracing::warn!(tool = %name, "call for unknown tool");
            return Err(McpError::tool_not_found(name));
        };

        let instance = Value::Object(sanitize_arguments(
            arguments.unwrap_or_default(),
            &tool.properties,
        ));
        if let Err(errors) = tool.validator.validate(&instance) {
            let message = format_validation_errors(name, errors);
            tracing::info!(tool = %name, "rejected invalid arguments");
            return Err(McpError::invalid_params(message));
        }
        let Value::Object(args) = instance else {
            return Err(McpError::invalid_params(format!(
                "Invalid arguments for tool {}",
                name
            )));
        };

        let call_id = Uuid::new_v4();
        let span = tracing::info_span!("tool_call", tool = %name, call_id = %call_id);
        let outcome = async {
            tracing::debug!("invoking tool");
            tool.handler.call(args).await
        }
        .instrument(span.clone())
        .await;

        Ok(match outcome {
            Ok(ToolOutput::Text(text)) => CallToolResult::text(text),
            Ok(ToolOutput::Content(content)) => CallToolResult {
                content,
                is_error: false,
            },
            Err(err) => {
                span.in_scope(|| {
                    tracing::warn!(kind = ?err.kind, error = %err.message, "tool call failed")
                });
                CallToolResult::error(err.message)
            }
        })
    }
}

/// Drops top-level keys the schema does not declare and null values, and
/// parses a `requestBody` sent as JSON text. `requestBody` is always kept so
/// the invoker can reject it on operations that take no body.
pub fn sanitize_arguments(args: Map<String, Value>, properties: &HashSet<String>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in args {
        if value.is_null() {
            continue;
        }
        if key != REQUEST_BODY_ARG && !properties.contains(&key) {
            tracing::debug!(argument = %key, "dropping undeclared argument");
            continue;
        }
        let value = match value {
            Value::String(raw) if key == REQUEST_BODY_ARG => {
                serde_json::from_str::<Value>(&raw).unwrap_or(Value::String(raw))
            }
            other => other,
        };
        out.insert(key, value);
    }
    out
}

fn format_validation_errors(tool_name: &str, errors: jsonschema::ErrorIterator) -> String {
    let mut lines = vec![format!("Invalid arguments for tool {}:", tool_name)];
    for err in errors.take(MAX_REPORTED_ERRORS) {
        let path = err.instance_path.to_string();
        let path = if path.is_empty() {
            "(root)".to_string()
        } else {
            path
        };
        let problem = match &err.kind {
            ValidationErrorKind::Required { property } => format!(
                "missing required field '{}'",
                property
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| property.to_string())
            ),
            ValidationErrorKind::Type { kind } => format!("expected {}", format_type_kind(kind)),
            ValidationErrorKind::Enum { options } => {
                let allowed: Vec<String> = options
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .map(|v| v.as_str().map(|s| s.to_string()).unwrap_or_else(|| v.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                format!("expected one of {}", allowed.join(", "))
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                format!("unknown field(s) {}", unexpected.join(", "))
            }
            _ => err.to_string(),
        };
        lines.push(format!("- {}: {}", path, problem));
    }
    lines.join("\n")
}

fn format_type_kind(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(primitive) => primitive.to_string(),
        TypeKind::Multiple(types) => {
            let list: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            if list.is_empty() {
                "unknown".to_string()
            } else {
                list.join(" | ")
            }
        }
    }
}
