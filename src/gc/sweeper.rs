//! Sweep orchestration: walk, classify, retain, delete
//!
//! Failures are contained per repository. A repository whose tag listing
//! fails is reported and the sweep moves on to the next one. Cancellation is
//! honored between repositories, never in the middle of one.

use crate::error::{RegistryError, Result};
use crate::gc::retention::{self, RetentionPlan, RetentionPolicy};
use crate::image::{Classification, Image};
use crate::logging::Logger;
use crate::registry::RegistryClient;
use crate::registry::operations::DeleteOutcome;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

const ALL_REPOSITORIES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepTarget {
    All,
    Repository(String),
}

impl FromStr for SweepTarget {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(RegistryError::Validation(
                "Target repository cannot be empty".to_string(),
            )),
            ALL_REPOSITORIES => Ok(SweepTarget::All),
            name => Ok(SweepTarget::Repository(name.to_string())),
        }
    }
}

impl fmt::Display for SweepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepTarget::All => f.write_str(ALL_REPOSITORIES),
            SweepTarget::Repository(name) => f.write_str(name),
        }
    }
}

/// Outcome of cleaning one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryReport {
    pub repository: String,
    pub images: usize,
    pub retained: usize,
    pub too_young: usize,
    pub unclassified: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RepositoryReport {
    fn from_plan(repository: &str, images: usize, plan: &RetentionPlan) -> Self {
        Self {
            repository: repository.to_string(),
            images,
            retained: plan.retained.len(),
            too_young: plan.too_young.len(),
            unclassified: plan.unclassified.len() + plan.unresolved.len(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted => self.deleted += 1,
            DeleteOutcome::Skipped(_) => self.skipped += 1,
            DeleteOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Aggregate of a sweep; advisory, a sweep never fails as a whole
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub repositories: Vec<RepositoryReport>,
    pub failed_repositories: Vec<(String, String)>,
    pub cancelled_repositories: Vec<String>,
}

impl SweepReport {
    pub fn deleted(&self) -> usize {
        self.repositories.iter().map(|r| r.deleted).sum()
    }

    pub fn failed_deletions(&self) -> usize {
        self.repositories.iter().map(|r| r.failed).sum()
    }

    pub fn skipped_deletions(&self) -> usize {
        self.repositories.iter().map(|r| r.skipped).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_repositories.is_empty() && self.failed_deletions() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedImage {
    pub image: Image,
    pub classification: Classification,
}

impl fmt::Display for ListedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}", self.image, self.classification.class)?;
        if let Some(ts) = self.classification.timestamp {
            match chrono::DateTime::from_timestamp(ts, 0) {
                Some(at) => write!(f, " {}", at.format("%Y-%m-%d %H:%M:%S"))?,
                None => write!(f, " {}", ts)?,
            }
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Repositories(Vec<String>),
    Images(Vec<ListedImage>),
}

pub struct Sweeper {
    client: RegistryClient,
    concurrency: usize,
    cancel: CancellationToken,
    now: Option<i64>,
    output: Logger,
}

impl Sweeper {
    pub fn new(client: RegistryClient) -> Self {
        let output = client.logger().clone();
        Self {
            client,
            concurrency: 1,
            cancel: CancellationToken::new(),
            now: None,
            output,
        }
    }

    /// Number of repositories cleaned at once; images within one repository
    /// are always handled sequentially
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pin the reference time used for age checks
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = Some(now);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn now(&self) -> i64 {
        self.now.unwrap_or_else(retention::now_unix)
    }

    /// Apply `policy` to one or all repositories
    pub async fn sweep(&self, target: &SweepTarget, policy: &RetentionPolicy) -> SweepReport {
        self.output.section(&format!("Cleaning registry target: {}", target));

        let repositories = match target {
            SweepTarget::All => self.client.repositories().list_repositories().await,
            SweepTarget::Repository(name) => vec![name.clone()],
        };
        let now = self.now();

        let results: Vec<(String, Result<RepositoryReport>)> = stream::iter(repositories)
            .map(|repository| async move {
                if self.cancel.is_cancelled() {
                    return (repository, Err(RegistryError::Cancelled));
                }
                let result = self.clean_repository(&repository, policy, now).await;
                (repository, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = SweepReport::default();
        for (repository, result) in results {
            match result {
                Ok(repo_report) => report.repositories.push(repo_report),
                Err(RegistryError::Cancelled) => {
                    report.cancelled_repositories.push(repository);
                }
                Err(e) => {
                    self.output
                        .error(&format!("Cleaning repository {} failed: {}", repository, e));
                    report.failed_repositories.push((repository, e.to_string()));
                }
            }
        }

        if !report.cancelled_repositories.is_empty() {
            self.output.warning(&format!(
                "Sweep cancelled, {} repositories not processed",
                report.cancelled_repositories.len()
            ));
        }
        self.output.info("Registry clean over");
        report
    }

    /// Resolve, plan and delete for a single repository
    pub async fn clean_repository(
        &self,
        repository: &str,
        policy: &RetentionPolicy,
        now: i64,
    ) -> Result<RepositoryReport> {
        self.output
            .subsection(&format!("Start cleaning repository {}", repository));

        let images = self.client.repositories().list_images(repository).await?;
        let plan = retention::plan(&images, policy, now);
        let mut report = RepositoryReport::from_plan(repository, images.len(), &plan);

        if plan.to_delete.is_empty() {
            self.output.verbose(&format!(
                "Nothing to delete in {} ({} images)",
                repository,
                images.len()
            ));
        }

        // Deleting by digest removes every tag pointing at it, so a digest
        // that a surviving tag shares must not be deleted.
        let survivors: HashMap<&str, &str> = images
            .iter()
            .filter(|image| !plan.to_delete.contains(image))
            .map(|image| (image.digest.as_str(), image.tag.as_str()))
            .collect();
        let mut handled_digests: HashSet<String> = HashSet::new();

        for image in &plan.to_delete {
            let outcome = if let Some(tag) = survivors.get(image.digest.as_str()) {
                let outcome = DeleteOutcome::Skipped(format!("digest shared with kept tag {}", tag));
                self.client.manifests().record(image, &outcome);
                outcome
            } else if handled_digests.contains(&image.digest) {
                let outcome = DeleteOutcome::Skipped("digest already deleted".to_string());
                self.client.manifests().record(image, &outcome);
                outcome
            } else {
                let outcome = self.client.manifests().delete_image(image).await;
                if !outcome.is_failed() {
                    handled_digests.insert(image.digest.clone());
                }
                outcome
            };
            report.record(&outcome);
        }

        self.output.info(&format!(
            "Clean registry repo {} over: {} deleted, {} failed, {} skipped, {} kept",
            repository,
            report.deleted,
            report.failed,
            report.skipped,
            report.retained + report.too_young + report.unclassified
        ));
        Ok(report)
    }

    /// Non-destructive inspection of the registry or one repository
    pub async fn list(&self, target: &SweepTarget, sort: bool) -> Result<Listing> {
        match target {
            SweepTarget::All => {
                let mut repositories = self.client.repositories().list_repositories().await;
                if sort {
                    repositories.sort();
                }
                Ok(Listing::Repositories(repositories))
            }
            SweepTarget::Repository(name) => {
                let images = self.client.repositories().list_images(name).await?;
                let mut listed: Vec<ListedImage> = images
                    .into_iter()
                    .map(|image| ListedImage {
                        classification: image.classification(),
                        image,
                    })
                    .collect();
                if sort {
                    listed.sort_by(|a, b| {
                        b.classification
                            .timestamp
                            .cmp(&a.classification.timestamp)
                            .then_with(|| a.image.tag.cmp(&b.image.tag))
                    });
                }
                Ok(Listing::Images(listed))
            }
        }
    }

    /// Manual delete, bypassing retention: one tag, or every tag of the repository
    pub async fn delete(&self, repository: &str, tag: Option<&str>) -> Result<Vec<(Image, DeleteOutcome)>> {
        let images = match tag {
            Some(tag) => vec![self.client.repositories().image_for_tag(repository, tag).await?],
            None => self.client.repositories().list_images(repository).await?,
        };

        self.output.section(&format!(
            "Deleting {} image(s) from {}",
            images.len(),
            repository
        ));

        let mut handled_digests: HashSet<String> = HashSet::new();
        let mut outcomes = Vec::with_capacity(images.len());
        for image in images {
            let outcome = if handled_digests.contains(&image.digest) {
                let outcome = DeleteOutcome::Skipped("digest already deleted".to_string());
                self.client.manifests().record(&image, &outcome);
                outcome
            } else {
                let outcome = self.client.manifests().delete_image(&image).await;
                if !outcome.is_failed() {
                    handled_digests.insert(image.digest.clone());
                }
                outcome
            };
            outcomes.push((image, outcome));
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!("all".parse::<SweepTarget>().unwrap(), SweepTarget::All);
        assert_eq!(
            "myapp/web".parse::<SweepTarget>().unwrap(),
            SweepTarget::Repository("myapp/web".to_string())
        );
        assert!("  ".parse::<SweepTarget>().is_err());
        assert_eq!(SweepTarget::Repository("x".to_string()).to_string(), "x");
    }

    #[test]
    fn test_report_totals() {
        let mut report = SweepReport::default();
        let mut a = RepositoryReport::default();
        a.record(&DeleteOutcome::Deleted);
        a.record(&DeleteOutcome::Deleted);
        a.record(&DeleteOutcome::Skipped("dry run".to_string()));
        let mut b = RepositoryReport::default();
        b.record(&DeleteOutcome::Failed(RegistryError::Timeout("slow".to_string())));
        report.repositories = vec![a, b];

        assert_eq!(report.deleted(), 2);
        assert_eq!(report.skipped_deletions(), 1);
        assert_eq!(report.failed_deletions(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_listed_image_display() {
        let image = Image::new("app", "release-0-abc", "sha256:00");
        let listed = ListedImage {
            classification: image.classification(),
            image,
        };
        assert_eq!(listed.to_string(), "app, release-0-abc, sha256:00 [release 1970-01-01 00:00:00]");
    }
}
