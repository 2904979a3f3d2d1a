//! Command-line argument parsing

use crate::cluster::DEFAULT_DOMAIN_KEY;
use crate::config::{DEFAULT_TIMEOUT_SECS, normalize_address};
use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use crate::gc::retention::{DEFAULT_KEEP_COUNT, DEFAULT_KEEP_DURATION_SECS, RetentionPolicy};
use crate::gc::sweeper::SweepTarget;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "registry-gc")]
#[command(about = "Inspect and garbage-collect images in a Docker registry")]
#[command(version)]
pub struct Args {
    /// Registry address; looked up from the cluster domain when omitted
    #[arg(
        long = "registry",
        global = true,
        help = "Registry URL, e.g. http://registry.lain.local"
    )]
    pub registry: Option<String>,

    #[arg(
        long = "domain-key",
        global = true,
        default_value = DEFAULT_DOMAIN_KEY,
        help = "Configuration store key holding the cluster domain"
    )]
    pub domain_key: String,

    /// Timeout in seconds for every network call
    #[arg(
        long = "timeout",
        global = true,
        help = "Timeout for each registry request in seconds [default: 5]"
    )]
    pub timeout: Option<u64>,

    #[arg(
        long = "page-size",
        global = true,
        help = "Entries requested per catalog/tag page"
    )]
    pub page_size: Option<usize>,

    #[arg(
        long = "concurrency",
        short = 'j',
        global = true,
        help = "Repositories cleaned in parallel [default: 1]"
    )]
    pub concurrency: Option<usize>,

    /// Dry run mode (plan without deleting)
    #[arg(
        long = "dry-run",
        global = true,
        help = "Show what would be deleted without deleting anything"
    )]
    pub dry_run: bool,

    #[arg(
        long = "insecure",
        short = 'k',
        global = true,
        help = "Skip TLS certificate verification"
    )]
    pub insecure: bool,

    #[arg(long = "verbose", short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long = "quiet", short = 'q', global = true, help = "Only report errors")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List repositories, or the images of one repository
    List {
        #[arg(
            long = "target",
            short = 't',
            default_value = "all",
            help = "Target repository in registry"
        )]
        target: String,

        #[arg(long = "sort", short = 's', help = "Sort repositories by name, images newest first")]
        sort: bool,
    },
    /// Delete one tag, or every tag of a repository, bypassing retention
    Delete {
        #[arg(long = "repo", short = 'r', help = "Repository to delete from")]
        repo: String,

        #[arg(long = "tag", short = 't', help = "Tag to delete; all tags when omitted")]
        tag: Option<String>,
    },
    /// Delete images beyond the retention policy
    Clean {
        #[arg(
            long = "target",
            short = 't',
            default_value = "all",
            help = "Clean target repository in registry"
        )]
        target: String,

        #[arg(
            long = "num",
            short = 'n',
            default_value_t = DEFAULT_KEEP_COUNT as i64,
            allow_negative_numbers = true,
            help = "Images kept per class once older than --time (must be bigger than 0)"
        )]
        num: i64,

        #[arg(
            long = "time",
            default_value_t = DEFAULT_KEEP_DURATION_SECS as i64,
            allow_negative_numbers = true,
            help = "Seconds during which images are never deleted (must be bigger than 0)"
        )]
        time: i64,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    pub fn timeout(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(1)
    }

    /// Validate arguments. Runs before any network or configuration-store call.
    pub fn validate(&self) -> Result<()> {
        ValidationErrorHandler::validate_timeout(self.timeout())?;

        if self.concurrency() == 0 {
            return Err(RegistryError::Validation(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.page_size == Some(0) {
            return Err(RegistryError::Validation(
                "Page size must be greater than 0".to_string(),
            ));
        }

        if let Some(registry) = &self.registry {
            ValidationErrorHandler::validate_registry_url(&normalize_address(registry))?;
        }

        if self.verbose && self.quiet {
            return Err(RegistryError::Validation(
                "--verbose and --quiet cannot be combined".to_string(),
            ));
        }

        match &self.command {
            Command::List { target, .. } => {
                target.parse::<SweepTarget>()?;
            }
            Command::Delete { repo, tag } => {
                if repo.trim().is_empty() {
                    return Err(RegistryError::Validation(
                        "Repository cannot be empty".to_string(),
                    ));
                }
                if tag.as_deref().is_some_and(|t| t.trim().is_empty()) {
                    return Err(RegistryError::Validation("Tag cannot be empty".to_string()));
                }
            }
            Command::Clean { target, num, time } => {
                target.parse::<SweepTarget>()?;
                RetentionPolicy::from_args(*num, *time)?;
            }
        }

        Ok(())
    }

    /// Fill unset options from the environment
    pub fn from_env(mut self) -> Self {
        if self.registry.is_none() {
            self.registry = std::env::var("REGISTRY_GC_REGISTRY").ok();
        }

        if self.timeout.is_none() {
            if let Ok(timeout) = std::env::var("REGISTRY_GC_TIMEOUT") {
                if let Ok(t) = timeout.parse() {
                    self.timeout = Some(t);
                }
            }
        }

        if self.concurrency.is_none() {
            if let Ok(concurrency) = std::env::var("REGISTRY_GC_CONCURRENCY") {
                if let Ok(c) = concurrency.parse() {
                    self.concurrency = Some(c);
                }
            }
        }

        if std::env::var("REGISTRY_GC_VERBOSE").is_ok() && !self.quiet {
            self.verbose = true;
        }

        if std::env::var("REGISTRY_GC_INSECURE").is_ok() {
            self.insecure = true;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_clean_defaults() {
        let args = parse(&["registry-gc", "clean"]);
        assert_eq!(
            args.command,
            Command::Clean {
                target: "all".to_string(),
                num: 20,
                time: 2_592_000,
            }
        );
        assert_eq!(args.timeout(), 5);
        assert_eq!(args.concurrency(), 1);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_invalid_retention_is_usage_error() {
        for argv in [
            vec!["registry-gc", "clean", "--num", "0"],
            vec!["registry-gc", "clean", "-n", "-3"],
            vec!["registry-gc", "clean", "--time", "0"],
        ] {
            let err = parse(&argv).validate().unwrap_err();
            assert!(err.is_usage_error(), "{:?}", argv);
        }
    }

    #[test]
    fn test_list_and_delete_forms() {
        let args = parse(&["registry-gc", "list", "-t", "myapp/web", "--sort"]);
        assert_eq!(
            args.command,
            Command::List {
                target: "myapp/web".to_string(),
                sort: true,
            }
        );

        let args = parse(&["registry-gc", "--dry-run", "delete", "-r", "myapp/web", "-t", "release-1-a"]);
        assert!(args.dry_run);
        assert_eq!(
            args.command,
            Command::Delete {
                repo: "myapp/web".to_string(),
                tag: Some("release-1-a".to_string()),
            }
        );
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_global_option_validation() {
        assert!(parse(&["registry-gc", "--timeout", "0", "list"]).validate().is_err());
        assert!(parse(&["registry-gc", "-j", "0", "clean"]).validate().is_err());
        assert!(parse(&["registry-gc", "-v", "-q", "list"]).validate().is_err());
        assert!(parse(&["registry-gc", "delete", "--repo", " "]).validate().is_err());
        assert!(
            parse(&["registry-gc", "--registry", "10.0.0.5:5000", "list"])
                .validate()
                .is_ok()
        );
    }
}
