//! In-memory Docker registry used by the integration tests
//!
//! Implements just enough of the v2 API for the collector: bearer challenge
//! with a token endpoint, paginated catalog, tag lists, HEAD and DELETE on
//! manifests. Failures can be injected per path.

#![allow(dead_code)]

use async_trait::async_trait;
use registry_gc::config::RegistryConfig;
use registry_gc::error::{RegistryError, Result};
use registry_gc::logging::Logger;
use registry_gc::registry::{HttpBackend, HttpRequest, HttpResponse, RegistryClient, TokenCache};
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use url::Url;

pub const REGISTRY: &str = "http://registry.test";
pub const REALM: &str = "http://auth.test/token";
pub const SERVICE: &str = "registry.test";

#[derive(Debug, Clone)]
pub enum Failure {
    Status(u16),
    Network,
    MissingDigest,
}

#[derive(Default)]
struct State {
    repositories: BTreeMap<String, Vec<(String, String)>>,
    catalog_page_size: Option<usize>,
    auth_enabled: bool,
    reject_tokens: bool,
    token_endpoint_down: bool,
    prefix: String,
    issued_tokens: u32,
    valid_tokens: HashSet<String>,
    failures: Vec<(Method, String, Failure)>,
    requests: Vec<(Method, String, Option<String>)>,
    deleted: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeRegistry {
    state: Mutex<State>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_image(&self, repo: &str, tag: &str, digest: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .repositories
            .entry(repo.to_string())
            .or_default()
            .push((tag.to_string(), digest.to_string()));
    }

    pub fn add_repository(&self, repo: &str) {
        self.state
            .lock()
            .unwrap()
            .repositories
            .entry(repo.to_string())
            .or_default();
    }

    pub fn paginate_catalog(&self, page_size: usize) {
        self.state.lock().unwrap().catalog_page_size = Some(page_size);
    }

    pub fn require_auth(&self) {
        self.state.lock().unwrap().auth_enabled = true;
    }

    /// Answer 401 to every registry request, even with a fresh token
    pub fn reject_all_tokens(&self) {
        let mut state = self.state.lock().unwrap();
        state.auth_enabled = true;
        state.reject_tokens = true;
    }

    /// Serve the API under `prefix`, e.g. `/mirror`
    pub fn mount_at(&self, prefix: &str) {
        self.state.lock().unwrap().prefix = prefix.trim_end_matches('/').to_string();
    }

    pub fn set_token_endpoint_down(&self, down: bool) {
        self.state.lock().unwrap().token_endpoint_down = down;
    }

    /// Invalidate every issued token, as if they all expired server-side
    pub fn revoke_tokens(&self) {
        self.state.lock().unwrap().valid_tokens.clear();
    }

    /// Fail requests whose path, or path and query, equals `path`
    pub fn fail(&self, method: Method, path: &str, failure: Failure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push((method, path.to_string(), failure));
    }

    pub fn token_requests(&self) -> usize {
        self.requests_to(&Method::GET, "/token")
    }

    /// Number of requests for `method` whose URL path equals `path`
    pub fn requests_to(&self, method: &Method, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(m, url, _)| m == method && Url::parse(url).map(|u| u.path() == path).unwrap_or(false))
            .count()
    }

    /// Request URLs in order, with the Authorization header each carried
    pub fn requests(&self) -> Vec<(Method, String, Option<String>)> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn tags(&self, repo: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .repositories
            .get(repo)
            .map(|tags| tags.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }

    fn handle(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = Url::parse(&request.url).map_err(|e| RegistryError::Parse(e.to_string()))?;
        let mut state = self.state.lock().unwrap();

        let authorization = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        state
            .requests
            .push((request.method.clone(), request.url.clone(), authorization.clone()));

        if url.host_str() == Some("auth.test") {
            return Self::issue_token(&mut state, &url);
        }

        let failure = state
            .failures
            .iter()
            .find(|(m, p, _)| *m == request.method && (p == url.path() || *p == path_and_query(&url)))
            .map(|(_, _, f)| f.clone());
        match &failure {
            Some(Failure::Network) => {
                return Err(RegistryError::Network(format!("connection refused: {}", url)));
            }
            Some(Failure::Status(status)) => return Ok(response(*status, Vec::new())),
            _ => {}
        }

        let path = url.path().to_string();
        let Some(rest) = path.strip_prefix(&format!("{}/v2/", state.prefix)) else {
            return Ok(response(404, Vec::new()));
        };

        let scope = if rest == "_catalog" {
            "registry:catalog:*".to_string()
        } else {
            format!("repository:{}:pull,delete", repo_of(rest))
        };
        if state.auth_enabled {
            let presented = authorization
                .as_deref()
                .and_then(|a| a.strip_prefix("Bearer "))
                .map(str::to_string);
            let accepted = !state.reject_tokens && presented.is_some_and(|t| state.valid_tokens.contains(&t));
            if !accepted {
                let mut unauthorized = response(401, Vec::new());
                unauthorized.headers.insert(
                    "www-authenticate",
                    HeaderValue::from_str(&format!(
                        r#"Bearer realm="{}",service="{}",scope="{}""#,
                        REALM, SERVICE, scope
                    ))
                    .unwrap(),
                );
                return Ok(unauthorized);
            }
        }

        if rest == "_catalog" {
            return Ok(Self::catalog(&state, &url));
        }

        if let Some(repo) = rest.strip_suffix("/tags/list") {
            return Ok(match state.repositories.get(repo) {
                Some(tags) => {
                    let tags: Vec<&str> = tags.iter().map(|(t, _)| t.as_str()).collect();
                    json_response(200, json!({"name": repo, "tags": tags}))
                }
                None => response(404, Vec::new()),
            });
        }

        if let Some((repo, reference)) = rest.rsplit_once("/manifests/") {
            let repo = repo.to_string();
            let reference = reference.to_string();
            return Ok(match request.method {
                Method::HEAD => {
                    let digest = state
                        .repositories
                        .get(&repo)
                        .and_then(|tags| tags.iter().find(|(t, _)| *t == reference))
                        .map(|(_, d)| d.clone());
                    match (digest, failure) {
                        (Some(_), Some(Failure::MissingDigest)) => response(200, Vec::new()),
                        (Some(digest), _) => {
                            let mut ok = response(200, Vec::new());
                            ok.headers
                                .insert("docker-content-digest", HeaderValue::from_str(&digest).unwrap());
                            ok
                        }
                        (None, _) => response(404, Vec::new()),
                    }
                }
                Method::DELETE => {
                    let tags = state.repositories.get_mut(&repo);
                    match tags {
                        Some(tags) if tags.iter().any(|(_, d)| *d == reference) => {
                            tags.retain(|(_, d)| *d != reference);
                            state.deleted.push((repo, reference));
                            response(202, Vec::new())
                        }
                        _ => response(404, Vec::new()),
                    }
                }
                _ => response(405, Vec::new()),
            });
        }

        Ok(response(404, Vec::new()))
    }

    fn issue_token(state: &mut State, url: &Url) -> Result<HttpResponse> {
        if state.token_endpoint_down {
            return Err(RegistryError::Network("token service unreachable".to_string()));
        }
        let has_service = url.query_pairs().any(|(k, v)| k == "service" && v == SERVICE);
        if !has_service {
            return Ok(response(400, Vec::new()));
        }
        state.issued_tokens += 1;
        let token = format!("token-{}", state.issued_tokens);
        state.valid_tokens.insert(token.clone());
        Ok(json_response(200, json!({"token": token})))
    }

    fn catalog(state: &State, url: &Url) -> HttpResponse {
        let names: Vec<&String> = state.repositories.keys().collect();
        let Some(page_size) = state.catalog_page_size else {
            return json_response(200, json!({"repositories": names}));
        };

        let last = url
            .query_pairs()
            .find(|(k, _)| k == "last")
            .map(|(_, v)| v.to_string());
        let page: Vec<&String> = names
            .iter()
            .filter(|name| last.as_ref().is_none_or(|last| name.as_str() > last.as_str()))
            .take(page_size)
            .copied()
            .collect();

        let mut resp = json_response(200, json!({"repositories": page}));
        if let Some(last_name) = page.last() {
            if names.last() != Some(last_name) {
                resp.headers.insert(
                    "link",
                    HeaderValue::from_str(&format!(
                        r#"<{}/v2/_catalog?last={}&n={}>; rel="next""#,
                        state.prefix, last_name, page_size
                    ))
                    .unwrap(),
                );
            }
        }
        resp
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn repo_of(rest: &str) -> &str {
    if let Some(repo) = rest.strip_suffix("/tags/list") {
        repo
    } else if let Some((repo, _)) = rest.rsplit_once("/manifests/") {
        repo
    } else {
        rest
    }
}

/// Log sink for asserting on emitted events
#[derive(Clone, Default)]
pub struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn response(status: u16, body: Vec<u8>) -> HttpResponse {
    HttpResponse {
        status,
        headers: HeaderMap::new(),
        body,
    }
}

pub fn json_response(status: u16, value: serde_json::Value) -> HttpResponse {
    response(status, serde_json::to_vec(&value).unwrap())
}

#[async_trait]
impl HttpBackend for FakeRegistry {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.handle(&request)
    }
}

pub fn digest(n: u32) -> String {
    format!("sha256:{:064x}", n)
}

pub fn client(registry: &Arc<FakeRegistry>) -> RegistryClient {
    client_with(registry, RegistryConfig::new(REGISTRY), false)
}

pub fn client_with(registry: &Arc<FakeRegistry>, config: RegistryConfig, dry_run: bool) -> RegistryClient {
    RegistryClient::builder(config)
        .with_backend(registry.clone())
        .with_logger(Logger::new(true))
        .with_token_cache(TokenCache::new())
        .with_dry_run(dry_run)
        .build()
        .unwrap()
}
