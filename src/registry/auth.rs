//! Bearer challenge parsing for Docker registry token authentication
//!
//! A registry rejecting an anonymous request answers 401 with
//! `WWW-Authenticate: Bearer realm="...",service="...",scope="..."`. The
//! realm names the token service; realm, service and scope together identify
//! the token to request.

use crate::error::{RegistryError, Result};
use serde::Deserialize;
use std::collections::HashMap;

const BEARER_SCHEME: &str = "Bearer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: Option<String>,
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Docker token services use `token`, OAuth2-style ones `access_token`
    pub fn into_token(self) -> Option<String> {
        self.token
            .or(self.access_token)
            .filter(|token| !token.is_empty())
    }
}

impl AuthChallenge {
    /// Parse a `WWW-Authenticate` header value into its parameters
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let params_str = match header.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case(BEARER_SCHEME) => rest,
            _ => {
                return Err(RegistryError::Auth(format!(
                    "Unsupported authentication challenge: {}",
                    header
                )));
            }
        };

        let params = split_params(params_str);

        let realm = params
            .get("realm")
            .filter(|realm| !realm.is_empty())
            .ok_or_else(|| {
                RegistryError::Auth(format!("Auth challenge missing realm parameter: {}", header))
            })?;

        Ok(Self {
            realm: realm.clone(),
            service: params.get("service").cloned().unwrap_or_default(),
            scope: params.get("scope").cloned().unwrap_or_default(),
        })
    }

    /// Token endpoint URL, also the token cache key
    pub fn token_url(&self) -> String {
        let separator = if self.realm.contains('?') { '&' } else { '?' };
        format!(
            "{}{}service={}&scope={}",
            self.realm, separator, self.service, self.scope
        )
    }
}

/// Split `key="value",key2="value2"` honoring commas inside quotes, as in
/// `scope="repository:app:pull,push"`.
fn split_params(params_str: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut flush = |param: &str| {
        if let Some((key, value)) = param.split_once('=') {
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"').to_string();
            if !key.is_empty() {
                params.insert(key, value);
            }
        }
    };

    for c in params_str.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                flush(&current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    flush(&current);

    params
}
