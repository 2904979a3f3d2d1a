//! Logging and output control
//!
//! This module provides the [`Logger`] used by every component. Diagnostic
//! messages are emitted as `tracing` events so they can be filtered with
//! `RUST_LOG`; command results (listings, summaries) go to stdout.

use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Target of the delete audit trail; enabled at `info` under every filter
pub const AUDIT_TARGET: &str = "registry_gc::audit";
const AUDIT_DIRECTIVE: &str = "registry_gc::audit=info";

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub quiet: bool,
    pub start_time: Option<Instant>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            quiet: false,
            start_time: Some(Instant::now()),
        }
    }

    pub fn new_quiet() -> Self {
        Self {
            verbose: false,
            quiet: true,
            start_time: Some(Instant::now()),
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        tracing::info!("=== {} ===", title);
    }

    /// Sub-section heading
    pub fn subsection(&self, title: &str) {
        tracing::info!("--- {} ---", title);
    }

    pub fn verbose(&self, message: &str) {
        tracing::debug!("{}", message);
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.verbose {
            tracing::debug!("{}", message);
        }
    }

    /// Information message
    pub fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    /// Success message
    pub fn success(&self, message: &str) {
        tracing::info!(outcome = "ok", "{}", message);
    }

    /// Warning message
    pub fn warning(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    /// Error message
    pub fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    /// Key-value pair summary display
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        if !self.quiet {
            println!("\n--- {} ---", title);
            for (key, value) in items {
                println!("  {}: {}", key, value);
            }
        }
    }

    /// Structured list output; this is command output and ignores `quiet`
    pub fn list(&self, title: &str, items: &[String]) {
        if !self.quiet {
            println!("\n--- {} ---", title);
        }
        for item in items {
            println!("{}", item);
        }
        if items.is_empty() && !self.quiet {
            println!("  (No items to display)");
        }
    }

    /// Time elapsed since the logger was created
    pub fn elapsed(&self) -> Duration {
        self.start_time.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        } else {
            format!("{}d{}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows the verbosity flags.
/// The delete audit target stays enabled either way.
/// Calling this twice is harmless, the second install is ignored.
pub fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .map(with_audit)
        .unwrap_or_else(|_| default_filter(verbose, quiet));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter used when `RUST_LOG` is unset
pub fn default_filter(verbose: bool, quiet: bool) -> EnvFilter {
    let level = if quiet {
        "error"
    } else if verbose {
        "registry_gc=debug,info"
    } else {
        "info"
    };
    with_audit(EnvFilter::new(level))
}

fn with_audit(filter: EnvFilter) -> EnvFilter {
    match AUDIT_DIRECTIVE.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}
