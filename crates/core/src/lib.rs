//! Moderated, branchable revision control for content records.
//!
//! The crate holds the pure domain (statuses, snapshots, the revision tree
//! index, the moderation transition table, the revert engine) plus the
//! [`engine::ModerationEngine`] that drives them through the storage seams in
//! [`store`]. Persistence backends live outside this crate except for the
//! in-memory [`memory::MemoryStore`].

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod memory;
pub mod models;
pub mod moderation;
pub mod registry;
pub mod revert;
pub mod roles;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod tree;
pub mod types;
pub mod version;
