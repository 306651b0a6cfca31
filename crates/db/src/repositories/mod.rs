//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&mut PgConnection` as the first argument, so callers can
//! run several of them on one transaction.

pub mod record_repo;
pub mod revision_repo;
pub mod version_repo;

pub use record_repo::RecordRepo;
pub use revision_repo::RevisionRepo;
pub use version_repo::VersionRepo;
