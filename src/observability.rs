//! Logging setup.
//!
//! Stdout carries the protocol stream, so every log line goes to stderr.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub const LOG_FORMAT_ENV: &str = "ALGOLIA_MCP_LOG_FORMAT";

/// Initialize the tracing subscriber once for the process.
///
/// Filter comes from `RUST_LOG` (default `info`); `ALGOLIA_MCP_LOG_FORMAT=json`
/// switches to JSON lines.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var(LOG_FORMAT_ENV)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_ansi(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}
