use std::env;
use std::path::PathBuf;

pub const SPEC_DIR_ENV: &str = "ALGOLIA_MCP_SPEC_DIR";
pub const STATE_PATH_ENV: &str = "ALGOLIA_MCP_STATE_PATH";

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn resolve_home_dir() -> Option<PathBuf> {
    normalize_env_path(env::var("HOME").ok())
}

fn resolve_xdg_state_dir() -> Option<PathBuf> {
    normalize_env_path(env::var("XDG_STATE_HOME").ok())
}

/// Directory holding the `<family>.json` API descriptions.
pub fn resolve_spec_dir() -> PathBuf {
    normalize_env_path(env::var(SPEC_DIR_ENV).ok()).unwrap_or_else(|| PathBuf::from("data"))
}

/// Location of the persisted credential state.
///
/// `ALGOLIA_MCP_STATE_PATH` wins, then `$XDG_STATE_HOME/algolia-mcp`, then
/// `$HOME/.algolia-mcp`, then the working directory.
pub fn resolve_state_path() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var(STATE_PATH_ENV).ok()) {
        return path;
    }
    if let Some(dir) = resolve_xdg_state_dir() {
        return dir.join("algolia-mcp").join("state.json");
    }
    if let Some(home) = resolve_home_dir() {
        return home.join(".algolia-mcp").join("state.json");
    }
    PathBuf::from(".algolia-mcp").join("state.json")
}
