//! Manifest operations for the registry client
//!
//! Deletion is irreversible, so every attempt is logged with its outcome.
//! The log lines carry `repo`, `tag`, `digest` and `outcome` fields and form
//! the audit trail of a sweep. They go to the audit target, which stays
//! enabled under `--quiet`.

use crate::error::RegistryError;
use crate::error::handlers::NetworkErrorHandler;
use crate::image::Image;
use crate::logging::{AUDIT_TARGET, Logger};
use crate::registry::transport::Transport;
use reqwest::Method;
use reqwest::header::HeaderMap;
use std::fmt;
use url::Url;

#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    Deleted,
    Skipped(String),
    Failed(RegistryError),
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DeleteOutcome::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            DeleteOutcome::Deleted => "deleted",
            DeleteOutcome::Skipped(_) => "skipped",
            DeleteOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteOutcome::Deleted => write!(f, "deleted"),
            DeleteOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            DeleteOutcome::Failed(err) => write!(f, "failed ({})", err),
        }
    }
}

#[derive(Clone)]
pub struct ManifestOperations {
    transport: Transport,
    address: Url,
    dry_run: bool,
    output: Logger,
}

impl ManifestOperations {
    pub fn new(transport: Transport, address: Url, output: Logger) -> Self {
        Self {
            transport,
            address,
            dry_run: false,
            output,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// DELETE the manifest `image` points at, by digest
    pub async fn delete_image(&self, image: &Image) -> DeleteOutcome {
        let outcome = if !image.has_digest() {
            DeleteOutcome::Skipped("no digest".to_string())
        } else if self.dry_run {
            DeleteOutcome::Skipped("dry run".to_string())
        } else {
            self.delete_manifest(&image.repo_name, &image.digest).await
        };

        self.record(image, &outcome);
        outcome
    }

    async fn delete_manifest(&self, repository: &str, digest: &str) -> DeleteOutcome {
        let url = match self
            .address
            .join(&format!("v2/{}/manifests/{}", repository, digest))
        {
            Ok(url) => url,
            Err(e) => return DeleteOutcome::Failed(e.into()),
        };

        match self
            .transport
            .request(Method::DELETE, url.as_str(), HeaderMap::new())
            .await
        {
            Ok(_) => DeleteOutcome::Deleted,
            Err(e) => DeleteOutcome::Failed(e),
        }
    }

    /// Audit log line for one delete attempt
    pub(crate) fn record(&self, image: &Image, outcome: &DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted | DeleteOutcome::Skipped(_) => tracing::info!(
                target: AUDIT_TARGET,
                repo = %image.repo_name,
                tag = %image.tag,
                digest = %image.digest,
                outcome = outcome.label(),
                "delete image: {} result: {}",
                image,
                outcome
            ),
            DeleteOutcome::Failed(err) => {
                let hint = err
                    .status()
                    .map(NetworkErrorHandler::describe_status)
                    .unwrap_or("request failed");
                tracing::warn!(
                    target: AUDIT_TARGET,
                    repo = %image.repo_name,
                    tag = %image.tag,
                    digest = %image.digest,
                    outcome = outcome.label(),
                    "delete image: {} result: {} [{}]",
                    image,
                    outcome,
                    hint
                );
            }
        }
        self.output.detail(&format!("{} -> {}", image.tag, outcome.label()));
    }
}
