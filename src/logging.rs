//! Diagnostic output setup.
//!
//! Events go to stderr through a `tracing-subscriber` fmt layer. The filter
//! comes from `RUST_LOG` when set, otherwise from the `--log-level` flag,
//! otherwise from `logLevel` in the config file, otherwise `info`.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LEVEL: &str = "info";

/// Picks the filter directive by precedence and normalises level names.
pub fn filter_directive(
    env: Option<&str>,
    cli_level: Option<&str>,
    config_level: Option<&str>,
) -> String {
    let chosen = [env, cli_level, config_level]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_LEVEL);
    normalize_level(chosen)
}

/// Accepts the level names older configs used alongside tracing's own.
fn normalize_level(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "fatal" => "error".to_string(),
        "all" => "trace".to_string(),
        "mark" => "info".to_string(),
        _ => level.to_string(),
    }
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init(cli_level: Option<&str>, config_level: Option<&str>) {
    let env = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(env.as_deref(), cli_level, config_level);
    let (filter, rejected) = match EnvFilter::try_new(&directive) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_LEVEL), Some(e)),
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        if let Some(e) = rejected {
            tracing::warn!(directive = %directive, error = %e, "Invalid log filter, using info");
        }
    }
}

#[cfg(test)]
#[path = "tests/logging_tests.rs"]
mod tests;
