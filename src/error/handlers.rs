//! Standardized error handling patterns shared by the registry operations

use crate::error::{RegistryError, Result};

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> RegistryError {
        if error.is_timeout() {
            RegistryError::Timeout(format!("{} timeout: {}", context, error))
        } else if error.is_connect() {
            RegistryError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.to_string().contains("dns") {
            RegistryError::Network(format!("DNS resolution error for {}: {}", context, error))
        } else if error.to_string().contains("certificate") {
            RegistryError::Network(format!(
                "TLS certificate error during {}: {}",
                context, error
            ))
        } else if error.is_decode() {
            RegistryError::Parse(format!("Malformed response during {}: {}", context, error))
        } else {
            RegistryError::Network(format!("{} network error: {}", context, error))
        }
    }

    /// Short human description of a non-2xx registry status
    pub fn describe_status(status: u16) -> &'static str {
        match status {
            401 => "unauthorized",
            403 => "forbidden",
            404 => "not found",
            405 => "operation not supported (is deletion enabled on the registry?)",
            429 => "rate limited",
            500 => "registry server error",
            502 | 503 => "registry unavailable",
            _ => "unexpected status",
        }
    }
}

/// Validation error utilities
pub struct ValidationErrorHandler;

impl ValidationErrorHandler {
    /// Positive integer option validation (`--num`, `--time`, ...)
    pub fn validate_positive(name: &str, value: i64) -> Result<u64> {
        if value < 1 {
            return Err(RegistryError::Validation(format!(
                "{} must be bigger than 0 (got {})",
                name, value
            )));
        }
        Ok(value as u64)
    }

    /// Standard timeout validation
    pub fn validate_timeout(timeout: u64) -> Result<()> {
        if timeout == 0 {
            return Err(RegistryError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if timeout > 3600 {
            return Err(RegistryError::Validation(
                "Timeout cannot exceed one hour (3600 seconds)".to_string(),
            ));
        }

        Ok(())
    }

    /// Standard registry URL validation
    pub fn validate_registry_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(RegistryError::Validation(
                "Registry URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(RegistryError::Validation(format!(
                "Registry URL must start with http:// or https://: {}",
                url
            )));
        }

        Ok(())
    }
}
