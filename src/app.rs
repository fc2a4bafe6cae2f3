use crate::constants::families;
use crate::errors::ToolError;
use crate::mcp::catalog::ToolCatalogBuilder;
use crate::mcp::dispatcher::ProtocolDispatcher;
use crate::mcp::filter::ToolFilter;
use crate::openapi::loader::{load_families, FamilyDescription};
use crate::services::credentials::{
    CredentialProvider, DashboardConfig, DashboardCredentials, StaticCredentials,
};
use crate::services::middleware::{ExplodeQueryParam, Middleware, RegionCorrection};
use crate::services::token_store::TokenStore;
use crate::services::transport::{HttpTransport, ReqwestTransport};
use crate::utils::paths::{resolve_spec_dir, resolve_state_path};
use std::path::PathBuf;
use std::sync::Arc;

/// Startup options for `start-server`.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub allow_tools: Vec<String>,
    pub deny_tools: Vec<String>,
    /// `applicationId:apiKey`; bypasses the dashboard flow.
    pub credentials: Option<String>,
    pub spec_dir: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
}

impl ServerOptions {
    pub fn spec_dir(&self) -> PathBuf {
        self.spec_dir.clone().unwrap_or_else(resolve_spec_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_path.clone().unwrap_or_else(resolve_state_path)
    }
}

pub struct App {
    pub dispatcher: Arc<ProtocolDispatcher>,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl App {
    pub async fn initialize(options: ServerOptions) -> Result<Self, ToolError> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
        Self::initialize_with(options, transport).await
    }

    /// Same as [`App::initialize`] with an injected transport.
    pub async fn initialize_with(
        options: ServerOptions,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ToolError> {
        let (credentials, default_application_id) =
            build_credentials(&options, transport.clone()).await?;

        let spec_dir = options.spec_dir();
        let descriptions = load_families(&spec_dir, families::ALL)?;
        if descriptions.is_empty() {
            tracing::warn!(dir = %spec_dir.display(), "no API descriptions found");
        }

        let filter = ToolFilter::from_lists(&options.allow_tools, &options.deny_tools);
        Self::from_descriptions(
            &descriptions,
            filter,
            credentials,
            transport,
            default_application_id,
        )
    }

    pub fn from_descriptions(
        descriptions: &[FamilyDescription],
        filter: ToolFilter,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn HttpTransport>,
        default_application_id: Option<String>,
    ) -> Result<Self, ToolError> {
        let builder = ToolCatalogBuilder::new(filter, credentials.clone(), transport)
            .with_default_application_id(default_application_id);
        let mut dispatcher = ProtocolDispatcher::new();
        for loaded in descriptions {
            let middlewares = middlewares_for(&loaded.family, &credentials);
            let count = builder.register(&mut dispatcher, &loaded.description, &middlewares)?;
            tracing::info!(family = %loaded.family, tools = count, "registered tools");
        }
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            credentials,
        })
    }
}

/// Request fixups a family needs before its requests are sent.
pub fn middlewares_for(
    family: &str,
    credentials: &Arc<dyn CredentialProvider>,
) -> Vec<Arc<dyn Middleware>> {
    let middleware: Arc<dyn Middleware> = match family {
        families::USAGE => Arc::new(ExplodeQueryParam::new("name")),
        families::INGESTION => Arc::new(RegionCorrection::new(credentials.clone())),
        _ => return Vec::new(),
    };
    vec![middleware]
}

async fn build_credentials(
    options: &ServerOptions,
    transport: Arc<dyn HttpTransport>,
) -> Result<(Arc<dyn CredentialProvider>, Option<String>), ToolError> {
    if let Some(raw) = &options.credentials {
        let credentials = StaticCredentials::parse(raw)?;
        let application_id = credentials.application_id().to_string();
        tracing::info!(application_id = %application_id, "using fixed credentials");
        return Ok((Arc::new(credentials), Some(application_id)));
    }

    let state_path = options.state_path();
    let store = TokenStore::load(&state_path)?;
    if store.snapshot().await.access_token.is_none() {
        return Err(ToolError::credential(format!(
            "No dashboard token found in {}",
            state_path.display()
        ))
        .with_hint("Authenticate first, or start the server with --credentials applicationId:apiKey"));
    }
    let config = DashboardConfig::from_env()?;
    tracing::info!(state = %state_path.display(), "using dashboard credentials");
    Ok((
        Arc::new(DashboardCredentials::new(config, transport, Arc::new(store))),
        None,
    ))
}

/// Every callable operation id, grouped by description title.
pub fn list_tools_report(spec_dir: &std::path::Path) -> Result<String, ToolError> {
    let descriptions = load_families(spec_dir, families::ALL)?;
    let mut lines = Vec::new();
    for loaded in &descriptions {
        let title = if loaded.description.title.is_empty() {
            loaded.family.as_str()
        } else {
            loaded.description.title.as_str()
        };
        lines.push(format!("{}:", title));
        for id in loaded.description.operation_ids() {
            lines.push(format!("  - {}", id));
        }
    }
    Ok(lines.join("\n"))
}
