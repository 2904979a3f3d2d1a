//! Registry GC Library
//!
//! This file serves as the library root for the registry-gc crate,
//! organizing and exposing the modules that make up the collector.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod gc;
pub mod image;
pub mod logging;
pub mod registry;

pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use gc::{RetentionPolicy, SweepTarget, Sweeper};
pub use logging::Logger;
pub use registry::RegistryClient;
