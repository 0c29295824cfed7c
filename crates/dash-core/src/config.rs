//! Configuration for the dash console client.
//!
//! Root configuration struct and nested sections with defaults, validation,
//! YAML file loading, `DASH_*` environment overrides, and tilde expansion.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::CoreError;

/// Default control-plane server URL.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Default number of rows requested per list page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

// ---------------------------------------------------------------------------
// Root config
// ---------------------------------------------------------------------------

/// Root configuration for the console client.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub global: GlobalConfig,
    pub server: ServerConfig,
    pub pagination: PaginationConfig,
    pub tail: TailConfig,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        let home = home_dir();
        Self {
            global: GlobalConfig {
                data_dir: home.join(".local/share/dash"),
                config_dir: home.join(".config/dash"),
            },
            server: ServerConfig::default(),
            pagination: PaginationConfig::default(),
            tail: TailConfig::default(),
            logging: LoggingConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Returns the effective session file path (explicit or derived from data_dir).
    pub fn session_path(&self) -> PathBuf {
        match &self.session.path {
            Some(path) => path.clone(),
            None => self.global.data_dir.join("session.json"),
        }
    }

    /// Creates required directories (data_dir, config_dir).
    pub fn ensure_directories(&self) -> Result<(), CoreError> {
        std::fs::create_dir_all(&self.global.data_dir)
            .map_err(|err| CoreError::io("create", &self.global.data_dir, err))?;
        std::fs::create_dir_all(&self.global.config_dir)
            .map_err(|err| CoreError::io("create", &self.global.config_dir, err))?;
        Ok(())
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        let url = self.server.url.trim();
        if url.is_empty() {
            return Err(CoreError::Validation("server.url is required".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::Validation(
                "server.url must start with http:// or https://".into(),
            ));
        }
        if self.server.request_timeout.is_zero() {
            return Err(CoreError::Validation(
                "server.request_timeout must be greater than 0".into(),
            ));
        }

        if self.pagination.page_size == 0 || self.pagination.page_size > 1_000 {
            return Err(CoreError::Validation(
                "pagination.page_size must be between 1 and 1000".into(),
            ));
        }

        if self.tail.base_interval < Duration::from_millis(100) {
            return Err(CoreError::Validation(
                "tail.base_interval must be at least 100ms".into(),
            ));
        }
        if self.tail.max_buffered_events == 0 {
            return Err(CoreError::Validation(
                "tail.max_buffered_events must be at least 1".into(),
            ));
        }

        match self.logging.level.to_lowercase().trim() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(CoreError::Validation(
                    "logging.level must be one of trace, debug, info, warn, error".into(),
                ))
            }
        }
        match self.logging.format.to_lowercase().trim() {
            "console" | "json" => {}
            _ => {
                return Err(CoreError::Validation(
                    "logging.format must be one of console, json".into(),
                ))
            }
        }

        Ok(())
    }

    /// Applies `DASH_*` environment overrides through the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get("DASH_SERVER_URL") {
            self.server.url = url.trim().to_string();
        }
        if let Some(project) = get("DASH_PROJECT") {
            self.server.project = project.trim().to_string();
        }
        if let Some(size) = get("DASH_PAGE_SIZE").and_then(|v| v.trim().parse().ok()) {
            self.pagination.page_size = size;
        }
        if let Some(level) = get("DASH_LOG_LEVEL") {
            self.logging.level = level.trim().to_string();
        }
        if let Some(format) = get("DASH_LOG_FORMAT") {
            self.logging.format = format.trim().to_string();
        }
        if let Some(path) = get("DASH_SESSION_FILE") {
            self.session.path = Some(PathBuf::from(expand_tilde(path.trim())));
        }
    }
}

// ---------------------------------------------------------------------------
// Section configs
// ---------------------------------------------------------------------------

/// Global settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
}

/// Remote control-plane server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub url: String,
    /// Project used when a command does not name one.
    pub project: String,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.into(),
            project: "main".into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// List pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    pub page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Live log tail polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailConfig {
    pub base_interval: Duration,
    pub max_jitter: Duration,
    pub max_buffered_events: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(2),
            max_jitter: Duration::from_millis(250),
            max_buffered_events: 2_000,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "console".into(),
        }
    }
}

/// Session persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    #[serde(default)]
    global: PartialGlobalConfig,
    #[serde(default)]
    server: PartialServerConfig,
    #[serde(default)]
    pagination: PartialPaginationConfig,
    #[serde(default)]
    tail: PartialTailConfig,
    #[serde(default)]
    logging: PartialLoggingConfig,
    #[serde(default)]
    session: PartialSessionConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PartialGlobalConfig {
    #[serde(default)]
    data_dir: String,
    #[serde(default)]
    config_dir: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialServerConfig {
    #[serde(default)]
    url: String,
    #[serde(default)]
    project: String,
    #[serde(default)]
    request_timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PartialPaginationConfig {
    #[serde(default)]
    page_size: usize,
}

#[derive(Debug, Default, Deserialize)]
struct PartialTailConfig {
    #[serde(default)]
    base_interval_ms: u64,
    #[serde(default)]
    max_jitter_ms: Option<u64>,
    #[serde(default)]
    max_buffered_events: usize,
}

#[derive(Debug, Default, Deserialize)]
struct PartialLoggingConfig {
    #[serde(default)]
    level: String,
    #[serde(default)]
    format: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialSessionConfig {
    #[serde(default)]
    path: String,
}

/// Load config with precedence defaults < config file < environment.
///
/// An explicit path that cannot be read is a hard error; a missing file in
/// the default search locations is not.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>), CoreError> {
    let mut cfg = Config::default();

    let (path_to_try, required) = match explicit {
        Some(path) => (Some(path.to_path_buf()), true),
        None => (find_config_file(), false),
    };

    let mut used = None;
    if let Some(path) = path_to_try {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                apply_yaml(&mut cfg, &text, &path)?;
                used = Some(path);
            }
            Err(err) if required => return Err(CoreError::io("read", path, err)),
            Err(_) => {}
        }
    }

    cfg.apply_env(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok((cfg, used))
}

/// Merge a YAML document into an existing config.
pub fn apply_yaml(cfg: &mut Config, text: &str, origin: &Path) -> Result<(), CoreError> {
    let partial: PartialConfig =
        serde_yaml::from_str(text).map_err(|source| CoreError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })?;
    apply_partial(cfg, partial);
    Ok(())
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) {
    if !partial.global.data_dir.trim().is_empty() {
        cfg.global.data_dir = PathBuf::from(expand_tilde(partial.global.data_dir.trim()));
    }
    if !partial.global.config_dir.trim().is_empty() {
        cfg.global.config_dir = PathBuf::from(expand_tilde(partial.global.config_dir.trim()));
    }
    if !partial.server.url.trim().is_empty() {
        cfg.server.url = partial.server.url.trim().trim_end_matches('/').to_string();
    }
    if !partial.server.project.trim().is_empty() {
        cfg.server.project = partial.server.project.trim().to_string();
    }
    if partial.server.request_timeout_ms > 0 {
        cfg.server.request_timeout = Duration::from_millis(partial.server.request_timeout_ms);
    }
    if partial.pagination.page_size > 0 {
        cfg.pagination.page_size = partial.pagination.page_size;
    }
    if partial.tail.base_interval_ms > 0 {
        cfg.tail.base_interval = Duration::from_millis(partial.tail.base_interval_ms);
    }
    if let Some(jitter) = partial.tail.max_jitter_ms {
        cfg.tail.max_jitter = Duration::from_millis(jitter);
    }
    if partial.tail.max_buffered_events > 0 {
        cfg.tail.max_buffered_events = partial.tail.max_buffered_events;
    }
    if !partial.logging.level.trim().is_empty() {
        cfg.logging.level = partial.logging.level.trim().to_string();
    }
    if !partial.logging.format.trim().is_empty() {
        cfg.logging.format = partial.logging.format.trim().to_string();
    }
    if !partial.session.path.trim().is_empty() {
        cfg.session.path = Some(PathBuf::from(expand_tilde(partial.session.path.trim())));
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if path.is_empty() {
        return path.to_string();
    }
    if path == "~" {
        return home_dir().display().to_string();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return home_dir().join(rest).display().to_string();
    }
    path.to_string()
}

/// Search for a configuration file in the standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    config_search_paths()
        .into_iter()
        .map(|dir| dir.join("config.yaml"))
        .find(|candidate| candidate.is_file())
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            paths.push(Path::new(&xdg).join("dash"));
        }
    }

    let home = home_dir();
    if home.as_os_str() != "" {
        paths.push(home.join(".config/dash"));
    }

    paths
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.url, DEFAULT_SERVER_URL);
        assert_eq!(cfg.pagination.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.logging.format, "console");
    }

    #[test]
    fn config_default_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_url_scheme() {
        let mut cfg = Config::default();
        cfg.server.url = "ftp://example".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("server.url"));
    }

    #[test]
    fn validate_rejects_zero_page_size() {
        let mut cfg = Config::default();
        cfg.pagination.page_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_log_format() {
        let mut cfg = Config::default();
        cfg.logging.format = "xml".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }

    #[test]
    fn validate_rejects_fast_tail_interval() {
        let mut cfg = Config::default();
        cfg.tail.base_interval = Duration::from_millis(10);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn yaml_overrides_only_present_fields() {
        let mut cfg = Config::default();
        let yaml = "server:\n  url: https://dash.example.com/\n  project: research\npagination:\n  page_size: 50\ntail:\n  max_jitter_ms: 0\n";
        apply_yaml(&mut cfg, yaml, Path::new("config.yaml")).unwrap();

        assert_eq!(cfg.server.url, "https://dash.example.com");
        assert_eq!(cfg.server.project, "research");
        assert_eq!(cfg.pagination.page_size, 50);
        assert_eq!(cfg.tail.max_jitter, Duration::ZERO);
        assert_eq!(cfg.tail.base_interval, Duration::from_secs(2));
        assert_eq!(cfg.logging.level, "warn");
    }

    #[test]
    fn yaml_parse_error_names_file() {
        let mut cfg = Config::default();
        let err = apply_yaml(&mut cfg, "server: [", Path::new("/etc/dash.yaml")).unwrap_err();
        assert!(err.to_string().contains("/etc/dash.yaml"));
    }

    #[test]
    fn env_overrides_win_and_blank_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("DASH_PROJECT", "prod"),
            ("DASH_PAGE_SIZE", "5"),
            ("DASH_LOG_LEVEL", "  "),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(cfg.server.project, "prod");
        assert_eq!(cfg.pagination.page_size, 5);
        assert_eq!(cfg.logging.level, "warn");
    }

    #[test]
    fn session_path_derived_from_data_dir() {
        let mut cfg = Config::default();
        cfg.global.data_dir = PathBuf::from("/var/dash");
        assert_eq!(cfg.session_path(), PathBuf::from("/var/dash/session.json"));
        cfg.session.path = Some(PathBuf::from("/tmp/s.json"));
        assert_eq!(cfg.session_path(), PathBuf::from("/tmp/s.json"));
    }

    #[test]
    fn expand_tilde_works() {
        let home = home_dir();
        assert_eq!(expand_tilde("~/x"), home.join("x").display().to_string());
        assert_eq!(expand_tilde("/abs"), "/abs");
        assert_eq!(expand_tilde(""), "");
    }
}
