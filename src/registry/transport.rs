//! HTTP transport for Docker Registry API v2
//!
//! [`HttpBackend`] is the seam between registry logic and the network: the
//! reqwest implementation is used in production and tests script responses
//! through the same trait. [`Transport`] layers the bearer challenge/response
//! handshake on top and turns every non-2xx outcome into an error.

use crate::config::RegistryConfig;
use crate::error::handlers::NetworkErrorHandler;
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::auth::AuthChallenge;
use crate::registry::token_manager::Authenticator;
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A registry request, independent of the HTTP client executing it
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value as a string; non-UTF-8 values are treated as absent
    pub fn header(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(RegistryError::from)
    }
}

/// Executes a single HTTP exchange
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed [`HttpBackend`] with a bounded per-request timeout
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout_duration())
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|e| RegistryError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let context = format!("{} {}", request.method, request.url);
        let is_head = request.method == Method::HEAD;

        let response = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, &context))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = if is_head {
            Vec::new()
        } else {
            response
                .bytes()
                .await
                .map_err(|e| NetworkErrorHandler::handle_network_error(&e, &context))?
                .to_vec()
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Authenticated registry transport
#[derive(Clone)]
pub struct Transport {
    backend: Arc<dyn HttpBackend>,
    authenticator: Authenticator,
    output: Logger,
}

impl Transport {
    pub fn new(backend: Arc<dyn HttpBackend>, authenticator: Authenticator, output: Logger) -> Self {
        Self {
            backend,
            authenticator,
            output,
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Issue a request, answering a bearer challenge if the registry sends one.
    ///
    /// Only 2xx responses are returned; every failure is logged here and
    /// handed back as an error for the caller to contain.
    pub async fn request(&self, method: Method, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        let result = self.request_with_auth(&method, url, headers).await;
        if let Err(e) = &result {
            self.output
                .warning(&format!("{} {} failed: {}", method, url, e));
        }
        result
    }

    async fn request_with_auth(&self, method: &Method, url: &str, headers: HeaderMap) -> Result<HttpResponse> {
        let response = self.send(method, url, &headers, None).await?;
        if response.status != 401 {
            return Self::ensure_success(method, url, response);
        }

        let challenge = Self::challenge_from(&response)?;
        self.output
            .detail(&format!("Auth challenge for {}: realm={}, scope={}", url, challenge.realm, challenge.scope));

        let token = self.authenticator.token(&challenge, false).await?;
        let response = self.send(method, url, &headers, Some(&token)).await?;
        if response.status != 401 {
            return Self::ensure_success(method, url, response);
        }

        self.output
            .verbose(&format!("Token rejected for {}, refreshing", url));
        let token = self.authenticator.token(&challenge, true).await?;
        let response = self.send(method, url, &headers, Some(&token)).await?;
        if response.status == 401 {
            return Err(RegistryError::Auth(format!(
                "Refreshed token rejected for {} {}",
                method, url
            )));
        }

        Self::ensure_success(method, url, response)
    }

    async fn send(&self, method: &Method, url: &str, headers: &HeaderMap, token: Option<&str>) -> Result<HttpResponse> {
        let mut request = HttpRequest::new(method.clone(), url);
        request.headers = headers.clone();

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| RegistryError::Auth(format!("Token is not a valid header value: {}", e)))?;
            request.headers.insert(AUTHORIZATION, value);
        }

        self.backend.execute(request).await
    }

    fn challenge_from(response: &HttpResponse) -> Result<AuthChallenge> {
        let header = response.header(WWW_AUTHENTICATE).ok_or_else(|| {
            RegistryError::Auth("Registry returned 401 without a WWW-Authenticate challenge".to_string())
        })?;
        AuthChallenge::parse(header)
    }

    fn ensure_success(method: &Method, url: &str, response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(RegistryError::Status {
                method: method.to_string(),
                url: url.to_string(),
                status: response.status,
            })
        }
    }
}
