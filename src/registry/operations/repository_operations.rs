//! Repository operations for the registry client
//!
//! Implements the read side of Docker Registry v2 used by the collector:
//! - Catalog listing with `Link` pagination (GET /v2/_catalog)
//! - Tag listing (GET /v2/{name}/tags/list)
//! - Digest resolution (HEAD /v2/{name}/manifests/{reference})

use crate::error::{RegistryError, Result};
use crate::image::{DigestUtils, Image};
use crate::logging::Logger;
use crate::registry::transport::Transport;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, LINK};
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DIGEST_HEADER: &str = "docker-content-digest";

/// Names collected from a paginated listing, possibly cut short by an error
#[derive(Debug, Default)]
pub struct PagedListing {
    pub items: Vec<String>,
    pub pages: usize,
    pub error: Option<RegistryError>,
}

#[derive(Clone)]
pub struct RepositoryOperations {
    transport: Transport,
    address: Url,
    page_size: Option<usize>,
    output: Logger,
}

impl RepositoryOperations {
    pub fn new(transport: Transport, address: Url, output: Logger) -> Self {
        Self {
            transport,
            address,
            page_size: None,
            output,
        }
    }

    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    /// List every repository in the registry.
    ///
    /// A failing page ends the walk; the names gathered so far are still
    /// returned so one bad page does not void the whole sweep.
    pub async fn list_repositories(&self) -> Vec<String> {
        let listing = match self.endpoint("v2/_catalog") {
            Ok(url) => self.collect_paginated(url, "repositories").await,
            Err(e) => PagedListing {
                error: Some(e),
                ..Default::default()
            },
        };

        if let Some(e) = &listing.error {
            self.output.error(&format!(
                "Catalog listing stopped after {} page(s) with {} repositories: {}",
                listing.pages,
                listing.items.len(),
                e
            ));
        } else {
            self.output.verbose(&format!(
                "Catalog lists {} repositories across {} page(s)",
                listing.items.len(),
                listing.pages
            ));
        }

        listing.items
    }

    /// List all tags of `repository`; fails only when the first page fails
    pub async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&format!("v2/{}/tags/list", repository))?;
        let listing = self.collect_paginated(url, "tags").await;

        match listing.error {
            Some(e) if listing.pages == 0 => Err(e),
            Some(e) => {
                self.output.warning(&format!(
                    "Tag listing for {} is partial ({} tags): {}",
                    repository,
                    listing.items.len(),
                    e
                ));
                Ok(listing.items)
            }
            None => {
                self.output
                    .verbose(&format!("Found {} tags for repository {}", listing.items.len(), repository));
                Ok(listing.items)
            }
        }
    }

    /// Resolve a tag (or digest) to the manifest digest the registry reports
    pub async fn resolve_digest(&self, repository: &str, reference: &str) -> Result<String> {
        let url = self.endpoint(&format!("v2/{}/manifests/{}", repository, reference))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MANIFEST_V2_MEDIA_TYPE));

        let response = self.transport.request(Method::HEAD, url.as_str(), headers).await?;
        let digest = response.header(DIGEST_HEADER).ok_or_else(|| {
            RegistryError::Parse(format!(
                "No Docker-Content-Digest header for {}:{}",
                repository, reference
            ))
        })?;

        DigestUtils::parse_header_digest(digest)
    }

    /// Resolve one tag into an [`Image`]
    pub async fn image_for_tag(&self, repository: &str, tag: &str) -> Result<Image> {
        let digest = self.resolve_digest(repository, tag).await?;
        Ok(Image::new(repository, tag, digest))
    }

    /// List the images of `repository`.
    ///
    /// Tags whose digest cannot be resolved are logged and dropped; they do
    /// not stop resolution of the remaining tags.
    pub async fn list_images(&self, repository: &str) -> Result<Vec<Image>> {
        let tags = self.list_tags(repository).await?;
        let mut images = Vec::with_capacity(tags.len());

        for tag in tags {
            match self.image_for_tag(repository, &tag).await {
                Ok(image) => {
                    self.output.detail(&format!("Resolved {}", image));
                    images.push(image);
                }
                Err(e) => {
                    self.output.warning(&format!(
                        "Skipping {}:{}, digest unresolved: {}",
                        repository, tag, e
                    ));
                }
            }
        }

        Ok(images)
    }

    /// `path` is relative to the registry address, which may carry a prefix
    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.address.join(path)?;
        if let Some(n) = self.page_size {
            if path.ends_with("/_catalog") || path.ends_with("/tags/list") {
                url.query_pairs_mut().append_pair("n", &n.to_string());
            }
        }
        Ok(url)
    }

    /// Follow `Link: <...>; rel="next"` headers, collecting `field` from each page
    async fn collect_paginated(&self, first: Url, field: &str) -> PagedListing {
        let mut listing = PagedListing::default();
        let mut visited = HashSet::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            if !visited.insert(url.to_string()) {
                self.output
                    .warning(&format!("Pagination loops back to {}, stopping", url));
                break;
            }

            let response = match self.transport.request(Method::GET, url.as_str(), HeaderMap::new()).await {
                Ok(response) => response,
                Err(e) => {
                    listing.error = Some(e);
                    break;
                }
            };

            let page = response
                .json::<Value>()
                .and_then(|body| string_array(&body, field));
            match page {
                Ok(items) => listing.items.extend(items),
                Err(e) => {
                    listing.error = Some(e);
                    break;
                }
            }
            listing.pages += 1;

            next = match response.header(LINK).and_then(next_link) {
                Some(target) => match self.address.join(&target) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        listing.error = Some(e.into());
                        None
                    }
                },
                None => None,
            };
        }

        listing
    }
}

/// Read `field` as an array of strings; missing or null means empty
fn string_array(body: &Value, field: &str) -> Result<Vec<String>> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(values)) => Ok(values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        Some(other) => Err(RegistryError::Parse(format!(
            "Expected `{}` to be an array, got {}",
            field, other
        ))),
    }
}

/// Extract the target of the `rel="next"` link from an RFC 5988 `Link` header
pub fn next_link(header: &str) -> Option<String> {
    let mut rest = header;

    while let Some(start) = rest.find('<') {
        let end = start + rest[start..].find('>')?;
        let target = &rest[start + 1..end];

        let params_end = rest[end..].find('<').map_or(rest.len(), |i| end + i);
        let params = &rest[end + 1..params_end];

        let is_next = params.split(';').any(|param| {
            param
                .trim()
                .trim_end_matches(',')
                .split_once('=')
                .is_some_and(|(key, value)| {
                    key.trim().eq_ignore_ascii_case("rel")
                        && value
                            .trim()
                            .trim_matches('"')
                            .split_whitespace()
                            .any(|rel| rel.eq_ignore_ascii_case("next"))
                })
        });

        if is_next {
            return Some(target.to_string());
        }
        rest = &rest[params_end..];
    }

    None
}
