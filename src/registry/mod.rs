//! Registry module for Docker registry interactions
//!
//! This module provides authentication, transport and client logic for
//! interacting with Docker Registry HTTP API v2: bearer token handshake with
//! a per-endpoint token cache, catalog and tag listing, digest resolution
//! and manifest deletion.

pub mod auth;
pub mod client;
pub mod operations;
pub mod token_manager;
pub mod transport;

pub use auth::AuthChallenge;
pub use client::{RegistryClient, RegistryClientBuilder};
pub use operations::{DeleteOutcome, ManifestOperations, RepositoryOperations};
pub use token_manager::{Authenticator, CachedToken, TokenCache};
pub use transport::{HttpBackend, HttpRequest, HttpResponse, ReqwestBackend, Transport};
