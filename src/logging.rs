//! Process-wide tracing subscriber setup for the server binary.

use std::sync::Once;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the global tracing subscriber.
///
/// Env:
/// - `RUST_LOG`   (e.g., "info,viewgate=debug")
/// - `LOG_FORMAT` ("plain" [default] | "json")
///
/// `default_filter` applies when `RUST_LOG` is unset. Later calls are no-ops.
pub fn init(default_filter: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_env("RUST_LOG")
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| {
                EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into())
            });

        let json = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if json {
            fmt()
                .with_env_filter(env_filter)
                .json()
                .with_target(true)
                .with_ansi(false)
                .init();
        } else {
            fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    });
}
