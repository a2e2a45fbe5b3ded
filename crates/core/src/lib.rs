//! Widget configuration versioning core.
//!
//! Domain types, payload checks, the payload diff engine, the store and
//! activation-lock seams, and the [`manager::VersionManager`] that enforces
//! the single-active-version and append-only invariants on top of them.

pub mod diff;
pub mod error;
pub mod manager;
pub mod memory;
pub mod payload;
pub mod retry;
pub mod store;
pub mod types;
pub mod version;
