//! Cluster configuration lookup
//!
//! The registry host is derived from the cluster domain kept in the cluster's
//! key-value configuration store. The collector only ever reads that one key.

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_DOMAIN_KEY: &str = "/lain/config/domain";
const ETCDCTL: &str = "etcdctl";

/// Source of the cluster domain name
#[async_trait]
pub trait DomainSource: Send + Sync {
    async fn domain(&self) -> Result<String>;
}

/// Reads the domain with `etcdctl get <key>`
#[derive(Debug, Clone)]
pub struct EtcdDomainSource {
    key: String,
    timeout: Duration,
}

impl EtcdDomainSource {
    pub fn new(key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            key: key.into(),
            timeout,
        }
    }
}

impl Default for EtcdDomainSource {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN_KEY, Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS))
    }
}

#[async_trait]
impl DomainSource for EtcdDomainSource {
    async fn domain(&self) -> Result<String> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(ETCDCTL).arg("get").arg(&self.key).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| RegistryError::Timeout(format!("{} get {} timed out", ETCDCTL, self.key)))?
        .map_err(|e| RegistryError::Config(format!("Failed to run {}: {}", ETCDCTL, e)))?;

        if !output.status.success() {
            return Err(RegistryError::Config(format!(
                "{} get {} failed: {}",
                ETCDCTL,
                self.key,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_domain(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Fixed domain, for explicit configuration and tests
#[derive(Debug, Clone)]
pub struct StaticDomainSource(pub String);

#[async_trait]
impl DomainSource for StaticDomainSource {
    async fn domain(&self) -> Result<String> {
        parse_domain(&self.0)
    }
}

fn parse_domain(raw: &str) -> Result<String> {
    let domain = raw.trim();
    if domain.is_empty() {
        return Err(RegistryError::Config("Cluster domain is empty".to_string()));
    }
    if domain.contains(char::is_whitespace) || domain.contains('/') {
        return Err(RegistryError::Config(format!(
            "Cluster domain is not a host name: {:?}",
            domain
        )));
    }
    Ok(domain.to_string())
}
