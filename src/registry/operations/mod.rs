//! Registry operations module
//!
//! Read operations (catalog, tags, digests) and manifest deletion, both
//! running over the shared authenticated [`Transport`](crate::registry::transport::Transport).

pub mod manifest_operations;
pub mod repository_operations;

pub use manifest_operations::{DeleteOutcome, ManifestOperations};
pub use repository_operations::{PagedListing, RepositoryOperations};
