//! Error types and handlers for registry operations

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Connection, DNS or TLS failures
    #[error("Network error: {0}")]
    Network(String),
    /// Request exceeded the configured timeout
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Token could not be obtained or was rejected
    #[error("Authentication error: {0}")]
    Auth(String),
    /// Registry answered outside the 2xx range
    #[error("Registry returned HTTP {status} for {method} {url}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },
    /// Malformed JSON, headers or URLs
    #[error("Parse error: {0}")]
    Parse(String),
    /// Invalid operator input, rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),
    /// Configuration lookup errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// File IO errors
    #[error("IO error: {0}")]
    Io(String),
    /// Operation aborted by the operator
    #[error("Operation cancelled")]
    Cancelled,
}

impl RegistryError {
    /// Usage errors map to a distinct process exit code
    pub fn is_usage_error(&self) -> bool {
        matches!(self, RegistryError::Validation(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        handlers::NetworkErrorHandler::handle_network_error(&err, "request")
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Parse(format!("Invalid URL: {}", err))
    }
}
