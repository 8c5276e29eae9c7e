//! Local-first, versioned asset synchronization.
//!
//! Persists a small set of user-owned assets (blobs and JSON documents) with
//! instant local reads and durable, versioned cloud backing:
//!
//! - Saves land in the local cache first (optimistic, the UI never waits on
//!   the network), then create a new immutable version in object storage.
//! - Explicit reconciliation passes compare the locally recorded version
//!   marker against the remote folder's latest object and fetch only on
//!   mismatch.
//! - A fixed-path legacy mirror keeps pre-versioning readers working, and a
//!   signed-access provider hands out short-lived URLs so large media can
//!   stream straight from storage.
//!
//! Entry point: [`SyncClient`]. Absence of connectivity or of a remote copy
//! is never an error; at worst a caller sees its last locally known value.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod remote;
pub mod session;
pub mod sync;
pub mod version;

pub use cache::{LocalCache, LocalStore, SqliteStore};
pub use client::SyncClient;
pub use config::{RemoteConfig, SyncConfig};
pub use error::{CacheError, RemoteFailure, StoreError, SyncError, SyncResult};
pub use key::{LogicalKey, OwnerId};
pub use remote::{HttpObjectStore, MemoryObjectStore, ObjectStore};
pub use session::{SessionProvider, StaticSession};
pub use sync::{CancelToken, Reconciled, SaveOutcome};
pub use version::{VersionMarker, VersionStamp, VersionedObject};
