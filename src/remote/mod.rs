//! Cloud side of the sync layer.
//!
//! A path-addressed [`ObjectStore`] backend (HTTP for production, in-memory
//! for tests) with three adapters above it:
//! - [`VersionedStore`]: one folder per logical key, one immutable object
//!   per write, latest decided by stamp order
//! - [`LegacyMirror`]: best-effort fixed-path copy for pre-versioning readers
//! - [`SignedAccess`]: time-limited direct-streaming URLs

mod backend;
mod http;
mod memory;
mod mirror;
mod signed;
mod versioned;

pub use backend::{ObjectInfo, ObjectStore};
pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;
pub use mirror::LegacyMirror;
pub use signed::SignedAccess;
pub use versioned::VersionedStore;
