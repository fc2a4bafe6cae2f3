pub mod server {
    pub const PROTOCOL_VERSION: &str = "2025-06-18";
    pub const NAME: &str = "algolia";
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

pub mod tools {
    /// Generic HTTP-verb passthrough operations. Never exposed, even when allow-listed.
    pub const INTERNAL_DENIED: &[&str] = &["customGet", "customPost", "customPut", "customDelete"];

    pub const REQUEST_BODY_ARG: &str = "requestBody";
    pub const APPLICATION_ID_ARG: &str = "applicationId";
}

pub mod security {
    /// Scheme carrying the application id; advertised to callers as `applicationId`.
    pub const APPLICATION_ID_SCHEME: &str = "appId";
    /// Scheme injected from the credential provider; never advertised.
    pub const API_KEY_SCHEME: &str = "apiKey";
    pub const SUPPORTED_KIND: &str = "apiKey";
}

pub mod http {
    pub const CLIENT_IDENTITY_HEADER: &str = "x-algolia-agent";
    pub const CONTENT_TYPE_JSON: &str = "application/json";
    pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

    pub fn client_identity() -> String {
        format!("algolia-mcp ({})", env!("CARGO_PKG_VERSION"))
    }
}

pub mod dashboard {
    pub const BASE_URL: &str = "https://api.dashboard.algolia.com";
    pub const TOKEN_URL: &str = "https://dashboard.algolia.com/oauth/token";
    pub const CLIENT_ID: &str = "algolia-mcp";
    pub const API_KEY_DESCRIPTION: &str = "API key generated by the Algolia MCP server";
    pub const REQUIRED_ACLS: &[&str] = &[
        "search",
        "listIndexes",
        "analytics",
        "browse",
        "settings",
        "addObject",
        "deleteObject",
        "deleteIndex",
        "editSettings",
        "recommendation",
        "logs",
    ];
}

pub mod families {
    pub const USAGE: &str = "usage";
    pub const INGESTION: &str = "ingestion";

    /// API families in registration order; each maps to `<name>.json` in the descriptions directory.
    pub const ALL: &[&str] = &[
        "search",
        "analytics",
        "recommend",
        "abtesting",
        "monitoring",
        USAGE,
        INGESTION,
        "collections",
        "query-suggestions",
    ];
}

pub mod files {
    pub const STATE_FILE_MODE: u32 = 0o600;
}
