//! Tracing subscriber setup.
//!
//! Filter priority (highest first): `DASH_LOG`, `RUST_LOG`, then the level
//! from [`LoggingConfig`]. Output goes to stderr so that stdout stays clean
//! for command output.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::CoreError;

/// Crate-family target prefix used in default directives.
pub const TARGET_PREFIX: &str = "dash";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    Json,
}

impl LogFormat {
    /// Parse a format string (defaults to Console).
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().trim() {
            "json" => Self::Json,
            _ => Self::Console,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(cfg: &LoggingConfig) -> Result<(), CoreError> {
    let filter = build_env_filter(cfg, |key| std::env::var(key).ok());
    let registry = tracing_subscriber::registry().with(filter);

    let result = match LogFormat::parse(&cfg.format) {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Console => {
            let ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());
            registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(ansi)
                        .with_target(true)
                        .compact(),
                )
                .try_init()
        }
    };
    result.map_err(|err| CoreError::LoggingInit(err.to_string()))
}

/// Build the env filter from overrides or the configured level.
pub fn build_env_filter<F>(cfg: &LoggingConfig, lookup: F) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    for key in ["DASH_LOG", "RUST_LOG"] {
        if let Some(directives) = lookup(key).filter(|v| !v.trim().is_empty()) {
            if let Ok(filter) = EnvFilter::try_new(directives.trim()) {
                return filter;
            }
        }
    }
    EnvFilter::try_new(default_directive(&cfg.level)).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Default directive for a configured level: the global level, with dash
/// crates raised to at least `info` when the level is more permissive.
pub fn default_directive(level: &str) -> String {
    let level = match level.to_lowercase().trim() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "error" => "error",
        _ => "warn",
    };
    match level {
        "trace" | "debug" => format!("warn,{TARGET_PREFIX}={level}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parse_defaults_to_console() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Console);
    }

    #[test]
    fn verbose_levels_scope_to_dash_targets() {
        assert_eq!(default_directive("debug"), "warn,dash=debug");
        assert_eq!(default_directive("info"), "info");
        assert_eq!(default_directive("bogus"), "warn");
    }

    #[test]
    fn dash_log_takes_priority_over_rust_log() {
        let cfg = LoggingConfig::default();
        let filter = build_env_filter(&cfg, |key| match key {
            "DASH_LOG" => Some("dash_feed=trace".into()),
            "RUST_LOG" => Some("error".into()),
            _ => None,
        });
        assert!(filter.to_string().contains("dash_feed=trace"));
    }

    #[test]
    fn unparseable_override_falls_back() {
        let cfg = LoggingConfig {
            level: "error".into(),
            format: "console".into(),
        };
        let filter = build_env_filter(&cfg, |key| match key {
            "DASH_LOG" => Some("dash=verbose".into()),
            _ => None,
        });
        assert_eq!(filter.to_string(), "error");
    }
}
