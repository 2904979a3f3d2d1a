//! Registry garbage collection
//!
//! [`retention`] decides which images of a repository may go, [`sweeper`]
//! drives listing, planning and deletion across repositories.

pub mod retention;
pub mod sweeper;

pub use retention::{RetentionPlan, RetentionPolicy, select_for_deletion};
pub use sweeper::{Listing, RepositoryReport, SweepReport, SweepTarget, Sweeper};
