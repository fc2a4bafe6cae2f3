mod common;

use algolia_mcp::app::{list_tools_report, App, ServerOptions};
use algolia_mcp::errors::ToolErrorKind;
use algolia_mcp::services::token_store::CredentialState;
use algolia_mcp::utils::paths::SPEC_DIR_ENV;
use common::{restore_env, search_document, usage_document, StubTransport, ENV_LOCK};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn write_description(dir: &Path, family: &str, document: &serde_json::Value) {
    std::fs::write(
        dir.join(format!("{}.json", family)),
        serde_json::to_string_pretty(document).unwrap(),
    )
    .unwrap();
}

fn options(spec_dir: &Path) -> ServerOptions {
    ServerOptions {
        spec_dir: Some(spec_dir.to_path_buf()),
        state_path: Some(spec_dir.join("state.json")),
        ..ServerOptions::default()
    }
}

fn tool_names(app: &App) -> Vec<String> {
    app.dispatcher
        .list_tools()
        .into_iter()
        .map(|t| t.name)
        .collect()
}

#[tokio::test]
async fn missing_token_without_credentials_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_description(dir.path(), "search", &search_document());

    let err = App::initialize_with(options(dir.path()), Arc::new(StubTransport::ok("{}")))
        .await
        .err()
        .expect("startup must fail");
    assert_eq!(err.kind, ToolErrorKind::Credential);
    assert!(err.hint.as_deref().unwrap_or_default().contains("--credentials"));
}

#[tokio::test]
async fn malformed_credentials_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut opts = options(dir.path());
    opts.credentials = Some("no-separator".to_string());
    let err = App::initialize_with(opts, Arc::new(StubTransport::ok("{}")))
        .await
        .err()
        .expect("startup must fail");
    assert_eq!(err.kind, ToolErrorKind::InvalidParams);
}

#[tokio::test]
async fn fixed_credentials_and_allow_list_shape_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    write_description(dir.path(), "search", &search_document());
    write_description(dir.path(), "usage", &usage_document());

    let mut opts = options(dir.path());
    opts.credentials = Some("APP:secret".to_string());
    opts.allow_tools = vec!["getSettings".to_string(), "getUsage".to_string()];
    let transport = Arc::new(StubTransport::ok("{}"));
    let app = App::initialize_with(opts, transport.clone()).await.unwrap();

    assert_eq!(tool_names(&app), vec!["getSettings", "getUsage"]);
    assert_eq!(transport.count(), 0, "startup makes no HTTP calls");

    let result = app
        .dispatcher
        .call_tool(
            "getSettings",
            json!({"indexName": "movies"}).as_object().cloned(),
        )
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(transport.last().header("x-algolia-api-key"), Some("secret"));
}

#[tokio::test]
async fn stored_dashboard_token_is_enough_to_start() {
    let dir = tempfile::tempdir().unwrap();
    write_description(dir.path(), "search", &search_document());
    let state = CredentialState {
        access_token: Some("token".to_string()),
        refresh_token: Some("refresh".to_string()),
        ..CredentialState::default()
    };
    std::fs::write(
        dir.path().join("state.json"),
        serde_json::to_string(&state).unwrap(),
    )
    .unwrap();

    let mut opts = options(dir.path());
    opts.deny_tools = vec!["browse".to_string()];
    let app = App::initialize_with(opts, Arc::new(StubTransport::ok("{}")))
        .await
        .unwrap();
    let names = tool_names(&app);
    assert!(names.contains(&"getSettings".to_string()));
    assert!(!names.contains(&"browse".to_string()));
}

#[tokio::test]
async fn corrupt_state_file_is_a_credential_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("state.json"), "{oops").unwrap();
    let err = App::initialize_with(options(dir.path()), Arc::new(StubTransport::ok("{}")))
        .await
        .err()
        .expect("startup must fail");
    assert_eq!(err.kind, ToolErrorKind::Credential);
}

#[tokio::test]
async fn malformed_description_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("search.json"), "{\"paths\": ").unwrap();
    let mut opts = options(dir.path());
    opts.credentials = Some("APP:secret".to_string());
    let err = App::initialize_with(opts, Arc::new(StubTransport::ok("{}")))
        .await
        .err()
        .expect("startup must fail");
    assert_eq!(err.kind, ToolErrorKind::SpecMalformed);
}

#[tokio::test]
async fn description_without_server_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = search_document();
    document.as_object_mut().unwrap().remove("servers");
    write_description(dir.path(), "search", &document);
    let mut opts = options(dir.path());
    opts.credentials = Some("APP:secret".to_string());
    let err = App::initialize_with(opts, Arc::new(StubTransport::ok("{}")))
        .await
        .err()
        .expect("startup must fail");
    assert_eq!(err.kind, ToolErrorKind::SpecMalformed);
    assert!(err.message.contains("no server"));
}

#[tokio::test]
async fn dangling_reference_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut document = search_document();
    document["paths"]["/1/indexes/{indexName}/query"]["post"]["requestBody"]["content"]
        ["application/json"]["schema"] = json!({"$ref": "#/components/schemas/Missing"});
    write_description(dir.path(), "search", &document);
    let mut opts = options(dir.path());
    opts.credentials = Some("APP:secret".to_string());
    let err = App::initialize_with(opts, Arc::new(StubTransport::ok("{}")))
        .await
        .err()
        .expect("startup must fail");
    assert_eq!(err.kind, ToolErrorKind::SpecMalformed);
}

#[tokio::test]
async fn list_tools_report_groups_by_title() {
    let dir = tempfile::tempdir().unwrap();
    write_description(dir.path(), "search", &search_document());
    write_description(dir.path(), "usage", &usage_document());

    let report = list_tools_report(dir.path()).unwrap();
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "Search API:");
    assert!(lines.contains(&"  - getSettings"));
    assert!(lines.contains(&"  - customGet"));
    assert!(!lines.contains(&"  - waitForTask"));
    assert!(lines.contains(&"Usage API:"));
    assert_eq!(lines.last(), Some(&"  - getUsage"));
}

#[tokio::test]
async fn spec_dir_falls_back_to_environment() {
    let _guard = ENV_LOCK.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let previous = std::env::var(SPEC_DIR_ENV).ok();
    std::env::set_var(SPEC_DIR_ENV, dir.path());

    let resolved = ServerOptions::default().spec_dir();
    restore_env(SPEC_DIR_ENV, previous);
    assert_eq!(resolved, dir.path());
}
