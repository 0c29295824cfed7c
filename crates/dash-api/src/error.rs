//! Normalized error types for console API calls.
//!
//! Transport-agnostic errors that hide reqwest details and give callers
//! actionable categories.

/// Error returned by [`crate::service::ConsoleApi`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The server could not be reached or the connection failed mid-request.
    #[error("server unavailable: {message}")]
    Transport { message: String },

    /// The server answered with a non-success status.
    #[error("server returned {code}: {body}")]
    Status { code: u16, body: String },

    /// Missing or rejected credentials.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// The response body did not match the expected shape.
    #[error("decode response: {message}")]
    Decode { message: String },

    /// The request was rejected before being sent.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl ApiError {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode {
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return Self::Status {
                code: status.as_u16(),
                body: err.to_string(),
            };
        }
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}
