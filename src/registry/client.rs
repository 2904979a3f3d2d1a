// RegistryClient ties the HTTP backend, token cache, authenticated transport
// and the repository/manifest operations together for one registry.

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::logging::Logger;
use crate::registry::operations::{ManifestOperations, RepositoryOperations};
use crate::registry::token_manager::{Authenticator, TokenCache};
use crate::registry::transport::{HttpBackend, ReqwestBackend, Transport};
use std::sync::Arc;
use url::Url;

pub struct RegistryClientBuilder {
    config: RegistryConfig,
    output: Logger,
    backend: Option<Arc<dyn HttpBackend>>,
    token_cache: Option<TokenCache>,
    dry_run: bool,
}

impl RegistryClientBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            output: Logger::default(),
            backend: None,
            token_cache: None,
            dry_run: false,
        }
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    /// Replace the reqwest backend, e.g. with a scripted one in tests
    pub fn with_backend(mut self, backend: Arc<dyn HttpBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_token_cache(mut self, cache: TokenCache) -> Self {
        self.token_cache = Some(cache);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        self.config.validate()?;
        let address = self.config.base_url()?;

        let backend: Arc<dyn HttpBackend> = match self.backend {
            Some(backend) => backend,
            None => Arc::new(ReqwestBackend::new(&self.config)?),
        };
        let cache = self.token_cache.unwrap_or_default();

        let authenticator = Authenticator::new(backend.clone(), cache.clone(), self.output.clone());
        let transport = Transport::new(backend, authenticator, self.output.clone());

        let repositories = RepositoryOperations::new(transport.clone(), address.clone(), self.output.clone())
            .with_page_size(self.config.page_size);
        let manifests = ManifestOperations::new(transport, address.clone(), self.output.clone())
            .with_dry_run(self.dry_run);

        Ok(RegistryClient {
            address,
            token_cache: cache,
            repositories,
            manifests,
            output: self.output,
        })
    }
}

#[derive(Clone)]
pub struct RegistryClient {
    address: Url,
    token_cache: TokenCache,
    repositories: RepositoryOperations,
    manifests: ManifestOperations,
    output: Logger,
}

impl RegistryClient {
    pub fn builder(config: RegistryConfig) -> RegistryClientBuilder {
        RegistryClientBuilder::new(config)
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.token_cache
    }

    pub fn repositories(&self) -> &RepositoryOperations {
        &self.repositories
    }

    pub fn manifests(&self) -> &ManifestOperations {
        &self.manifests
    }

    pub fn logger(&self) -> &Logger {
        &self.output
    }
}
