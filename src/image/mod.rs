//! Registry image model
//!
//! An [`Image`] is one tag of one repository together with the manifest
//! digest it resolved to. Images are discovered fresh on every sweep and
//! never mutated; [`classifier`] derives the build-lifecycle class from the tag.

pub mod classifier;
pub mod digest;

pub use classifier::{Classification, ImageClass, classify};
pub use digest::DigestUtils;

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Image {
    pub repo_name: String,
    pub tag: String,
    /// Manifest digest; empty when resolution failed
    pub digest: String,
}

impl Image {
    pub fn new(repo_name: impl Into<String>, tag: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            tag: tag.into(),
            digest: digest.into(),
        }
    }

    /// Only images with a resolved digest can be addressed for deletion
    pub fn has_digest(&self) -> bool {
        !self.digest.is_empty()
    }

    pub fn classification(&self) -> Classification {
        classify(&self.tag)
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.repo_name, self.tag, self.digest)
    }
}
