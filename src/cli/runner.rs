//! Runner executing one parsed command against the registry

use crate::cli::args::{Args, Command};
use crate::cluster::{DomainSource, EtcdDomainSource};
use crate::config::{DEFAULT_REGISTRY_HOST, RegistryConfig};
use crate::error::Result;
use crate::gc::retention::RetentionPolicy;
use crate::gc::sweeper::{Listing, SweepReport, SweepTarget, Sweeper};
use crate::logging::Logger;
use crate::registry::RegistryClient;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };

        Self { args, output }
    }

    pub async fn run(&self) -> Result<()> {
        // usage errors surface before any network call
        self.args.validate()?;

        let source = EtcdDomainSource::new(
            self.args.domain_key.clone(),
            Duration::from_secs(self.args.timeout()),
        );
        let config = self.registry_config(&source).await;
        self.output.verbose(&format!("Using registry {}", config.address));

        let client = RegistryClient::builder(config)
            .with_logger(self.output.clone())
            .with_dry_run(self.args.dry_run)
            .build()?;

        let cancel = CancellationToken::new();
        let sweeper = Sweeper::new(client)
            .with_concurrency(self.args.concurrency())
            .with_cancellation(cancel.clone());

        let signal_guard = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current repository");
                cancel.cancel();
            }
        });

        let result = self.dispatch(&sweeper).await;
        signal_guard.abort();
        result
    }

    /// Registry configuration from `--registry`, or from the cluster domain
    pub async fn registry_config(&self, source: &dyn DomainSource) -> RegistryConfig {
        let config = match &self.args.registry {
            Some(address) => RegistryConfig::new(address),
            None => match source.domain().await {
                Ok(domain) => RegistryConfig::for_domain(&domain),
                Err(e) => {
                    self.output.warning(&format!(
                        "Cluster domain lookup failed ({}), falling back to {}",
                        e, DEFAULT_REGISTRY_HOST
                    ));
                    RegistryConfig::default()
                }
            },
        };

        config
            .with_timeout(self.args.timeout())
            .with_page_size(self.args.page_size)
            .with_insecure(self.args.insecure)
    }

    async fn dispatch(&self, sweeper: &Sweeper) -> Result<()> {
        match &self.args.command {
            Command::List { target, sort } => {
                let target: SweepTarget = target.parse()?;
                match sweeper.list(&target, *sort).await? {
                    Listing::Repositories(repositories) => {
                        self.output.list("Repositories", &repositories);
                    }
                    Listing::Images(images) => {
                        let lines: Vec<String> = images.iter().map(ToString::to_string).collect();
                        self.output.list(&format!("Images in {}", target), &lines);
                    }
                }
            }
            Command::Delete { repo, tag } => {
                let outcomes = sweeper.delete(repo, tag.as_deref()).await?;
                let deleted = outcomes.iter().filter(|(_, o)| o.is_deleted()).count();
                let failed = outcomes.iter().filter(|(_, o)| o.is_failed()).count();
                self.output.summary_kv(
                    "Delete summary",
                    &[
                        ("Repository", repo.clone()),
                        ("Deleted", deleted.to_string()),
                        ("Failed", failed.to_string()),
                        ("Skipped", (outcomes.len() - deleted - failed).to_string()),
                    ],
                );
            }
            Command::Clean { target, num, time } => {
                let target: SweepTarget = target.parse()?;
                let policy = RetentionPolicy::from_args(*num, *time)?;
                if self.args.dry_run {
                    self.output.info("Dry run mode - no manifest will be deleted");
                }
                let report = sweeper.sweep(&target, &policy).await;
                self.print_report(&report, &policy);
            }
        }

        Ok(())
    }

    fn print_report(&self, report: &SweepReport, policy: &RetentionPolicy) {
        let mut items = vec![
            (
                "Policy",
                format!(
                    "keep {} per class, never before {}",
                    policy.keep_count(),
                    self.output.format_duration(policy.keep_duration())
                ),
            ),
            ("Repositories cleaned", report.repositories.len().to_string()),
            ("Repositories failed", report.failed_repositories.len().to_string()),
            ("Images deleted", report.deleted().to_string()),
            ("Deletes failed", report.failed_deletions().to_string()),
            ("Deletes skipped", report.skipped_deletions().to_string()),
            ("Elapsed", self.output.format_duration(self.output.elapsed())),
        ];
        if !report.cancelled_repositories.is_empty() {
            items.push((
                "Repositories not processed",
                report.cancelled_repositories.len().to_string(),
            ));
        }
        self.output.summary_kv("Sweep summary", &items);

        for (repository, reason) in &report.failed_repositories {
            self.output
                .error(&format!("Repository {} failed: {}", repository, reason));
        }
        if report.is_clean() {
            self.output.success("Sweep finished without failures");
        } else {
            self.output
                .warning("Sweep finished with failures; they will be retried by the next sweep");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::StaticDomainSource;
    use clap::Parser;

    fn runner(argv: &[&str]) -> Runner {
        Runner::new(Args::try_parse_from(argv).unwrap())
    }

    #[tokio::test]
    async fn test_registry_from_domain() {
        let runner = runner(&["registry-gc", "--timeout", "9", "list"]);
        let config = runner
            .registry_config(&StaticDomainSource("lain.example.com".to_string()))
            .await;
        assert_eq!(config.address, "http://registry.lain.example.com");
        assert_eq!(config.timeout, 9);
    }

    #[tokio::test]
    async fn test_explicit_registry_wins() {
        let runner = runner(&["registry-gc", "--registry", "https://hub.internal/", "list"]);
        let config = runner
            .registry_config(&StaticDomainSource("lain.example.com".to_string()))
            .await;
        assert_eq!(config.address, "https://hub.internal");
    }

    #[tokio::test]
    async fn test_domain_failure_falls_back() {
        let runner = runner(&["registry-gc", "list"]);
        let config = runner.registry_config(&StaticDomainSource(String::new())).await;
        assert_eq!(config.address, "http://registry.lain.local");
    }

    #[tokio::test]
    async fn test_usage_error_before_network() {
        let runner = runner(&["registry-gc", "--registry", "http://127.0.0.1:9", "clean", "--num", "0"]);
        let err = runner.run().await.unwrap_err();
        assert!(err.is_usage_error());
    }
}
