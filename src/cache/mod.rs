//! Durable local cache for asset values and version markers.
//!
//! This module provides the device-side half of the sync layer:
//! - A raw key/value store trait with a SQLite implementation
//! - An owner-scoping layer that also tracks per-key version markers
//! - Lazy migration of legacy (pre-owner-scoping) entries

mod layer;
mod store;

pub use layer::LocalCache;
pub use store::{LocalStore, SqliteStore};
