//! Error types shared by configuration, session and logging setup.

use std::path::PathBuf;

/// Errors raised while loading local client state.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A config or session file could not be read or written.
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for the expected shape.
    #[error("parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A loaded configuration failed validation.
    #[error("invalid config: {0}")]
    Validation(String),

    /// A stored session file is corrupt.
    #[error("decode session {path}: {source}")]
    SessionDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A session could not be serialized.
    #[error("encode session: {0}")]
    SessionEncode(#[source] serde_json::Error),

    /// The global tracing subscriber was already installed.
    #[error("logging already initialized: {0}")]
    LoggingInit(String),
}

impl CoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
