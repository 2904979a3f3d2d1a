//! Token cache and bearer token acquisition
//!
//! Tokens are cached per token endpoint URL for the lifetime of the process.
//! A token the registry rejects is expired explicitly and refetched; a token
//! whose `expires_in` has elapsed is treated as a cache miss.

use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::auth::{AuthChallenge, TokenResponse};
use crate::registry::transport::{HttpBackend, HttpRequest};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: Option<Instant>,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            token: token.into(),
            expires_at: expires_in.map(|ttl| Instant::now() + ttl),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Thread-safe token cache keyed by token endpoint URL
///
/// Concurrent refreshes of the same key are allowed; the last writer wins.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    entries: Arc<RwLock<HashMap<String, CachedToken>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live token for `key`, if any
    pub fn get(&self, key: &str) -> Option<String> {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.token.clone())
    }

    pub fn insert(&self, key: impl Into<String>, token: CachedToken) {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.into(), token);
    }

    /// Drop the entry for `key`; returns whether one existed
    pub fn expire(&self, key: &str) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Obtains bearer tokens for registry challenges, backed by a [`TokenCache`]
#[derive(Clone)]
pub struct Authenticator {
    backend: Arc<dyn HttpBackend>,
    cache: TokenCache,
    output: Logger,
}

impl Authenticator {
    pub fn new(backend: Arc<dyn HttpBackend>, cache: TokenCache, output: Logger) -> Self {
        Self {
            backend,
            cache,
            output,
        }
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Token for `challenge`. With `force_refresh` the cached entry is
    /// expired first and a new token is always requested.
    pub async fn token(&self, challenge: &AuthChallenge, force_refresh: bool) -> Result<String> {
        let token_url = challenge.token_url();

        if force_refresh {
            if self.cache.expire(&token_url) {
                self.output
                    .verbose(&format!("Expired cached token for {}", token_url));
            }
        } else if let Some(token) = self.cache.get(&token_url) {
            self.output.detail(&format!("Using cached token for {}", token_url));
            return Ok(token);
        }

        match self.fetch_token(&token_url).await {
            Ok(cached) => {
                let token = cached.token.clone();
                self.cache.insert(token_url, cached);
                Ok(token)
            }
            Err(e) => {
                self.output.error(&format!("Failed to obtain token: {}", e));
                Err(e)
            }
        }
    }

    async fn fetch_token(&self, token_url: &str) -> Result<CachedToken> {
        self.output.verbose(&format!("Requesting token from: {}", token_url));

        let response = self
            .backend
            .execute(HttpRequest::get(token_url))
            .await
            .map_err(|e| RegistryError::Auth(format!("Token endpoint {} unreachable: {}", token_url, e)))?;

        if !response.is_success() {
            return Err(RegistryError::Auth(format!(
                "Token endpoint {} returned HTTP {}",
                token_url, response.status
            )));
        }

        let body: TokenResponse = response.json().map_err(|e| {
            RegistryError::Auth(format!("Malformed token response from {}: {}", token_url, e))
        })?;

        let expires_in = body.expires_in.map(Duration::from_secs);
        let token = body.into_token().ok_or_else(|| {
            RegistryError::Auth(format!("Token response from {} has no token", token_url))
        })?;

        self.output
            .detail(&format!("Token obtained (length: {} chars)", token.len()));

        Ok(CachedToken::new(token, expires_in))
    }
}
