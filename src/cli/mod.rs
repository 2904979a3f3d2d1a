//! Command line interface module
//!
//! Argument parsing, validation and the runner dispatching `list`, `delete`
//! and `clean` onto the sweep orchestrator.

pub mod args;
pub mod runner;

pub use args::{Args, Command};
pub use runner::Runner;
