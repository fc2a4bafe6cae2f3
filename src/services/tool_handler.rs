use crate::errors::ToolError;
use crate::mcp::protocol::ContentItem;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// What a handler hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Wrapped into a single text content item.
    Text(String),
    /// Passed through unchanged.
    Content(Vec<ContentItem>),
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs one call with arguments that already passed validation.
    async fn call(&self, args: Map<String, Value>) -> Result<ToolOutput, ToolError>;
}
