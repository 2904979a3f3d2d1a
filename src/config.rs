//! Configuration for registry access and registry address resolution

use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Per-request timeout applied to every registry and token call
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
/// Registry host used when the cluster domain cannot be looked up
pub const DEFAULT_REGISTRY_HOST: &str = "registry.lain.local";
/// Registry hosts are named `registry.<cluster domain>`
pub const REGISTRY_HOST_PREFIX: &str = "registry.";

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub address: String,
    pub timeout: u64,
    pub page_size: Option<usize>,
    pub insecure: bool,
}

impl RegistryConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: normalize_address(address),
            timeout: DEFAULT_TIMEOUT_SECS,
            page_size: None,
            insecure: false,
        }
    }

    /// Build the configuration for the registry serving a cluster domain
    pub fn for_domain(domain: &str) -> Self {
        Self::new(&format!("{}{}", REGISTRY_HOST_PREFIX, domain.trim()))
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Address as a base URL for the v2 API. The path always ends in `/` so
    /// relative `v2/...` joins keep any prefix the registry is served under.
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.address)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<()> {
        ValidationErrorHandler::validate_registry_url(&self.address)?;
        ValidationErrorHandler::validate_timeout(self.timeout)?;

        if self.page_size == Some(0) {
            return Err(RegistryError::Validation(
                "Page size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_HOST)
    }
}

/// Add the `http://` scheme when missing and drop trailing slashes.
///
/// Registries inside a cluster are served over plain HTTP, so a bare host
/// name defaults to `http`.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
