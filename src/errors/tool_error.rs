use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The API description cannot be used (dangling `$ref`, no server entry).
    SpecMalformed,
    /// Two tools resolved to the same name.
    DuplicateTool,
    /// The caller supplied unusable arguments.
    InvalidParams,
    /// A security requirement cannot be satisfied for this call.
    SecurityConfig,
    /// The credential provider failed to produce a key or token.
    Credential,
    /// The outbound request never produced a response.
    Network,
    Internal,
}

impl ToolErrorKind {
    /// Startup-fatal kinds abort initialization instead of failing one call.
    pub fn is_fatal(self) -> bool {
        matches!(self, ToolErrorKind::SpecMalformed | ToolErrorKind::DuplicateTool)
    }
}

#[derive(Debug, Clone, Serialize, Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn spec_malformed(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::SpecMalformed, "SPEC_MALFORMED", message)
    }

    pub fn duplicate_tool(name: &str) -> Self {
        Self::new(
            ToolErrorKind::DuplicateTool,
            "DUPLICATE_TOOL",
            format!("Tool with name {} already exists", name),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn security_config(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::SecurityConfig, "SECURITY_CONFIG", message)
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Credential, "CREDENTIAL", message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Network, "NETWORK", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, "INTERNAL", message)
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::internal(err.to_string())
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        ToolError::network(err.to_string())
    }
}
