//! Error taxonomy for the sync layer.
//!
//! Only local cache failures propagate to callers: without a working local
//! cache no durability guarantee can be offered. Everything remote degrades
//! to "not updated" / "local only" at exactly one boundary, carried there as
//! a typed [`RemoteFailure`] value rather than a swallowed exception.

use thiserror::Error;

/// Failure of the on-device cache. Fatal to the calling operation.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache database error: {0}")]
  Database(#[from] rusqlite::Error),
  #[error("failed to open cache at {path}: {source}")]
  Open {
    path: String,
    source: rusqlite::Error,
  },
  #[error("failed to create cache directory: {0}")]
  CreateDir(#[from] std::io::Error),
  #[error("cache lock poisoned")]
  LockPoisoned,
  #[error("could not determine data directory")]
  NoDataDir,
  #[error("failed to serialize document: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Error from the underlying object storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
  /// Network or storage-side failure.
  #[error("object storage unavailable: {0}")]
  Unavailable(String),
  /// Permission denied (bad token, listing disabled, foreign owner).
  #[error("object storage access denied: {0}")]
  Denied(String),
  /// The addressed object does not exist.
  #[error("object not found: {0}")]
  NotFound(String),
  /// An object already exists at the path of a no-overwrite write.
  #[error("object already exists: {0}")]
  AlreadyExists(String),
  /// Backend returned something the adapter could not interpret.
  #[error("object storage backend error: {0}")]
  Backend(String),
}

impl StoreError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, StoreError::NotFound(_))
  }
}

/// Why a remote step was skipped or downgraded.
///
/// These never surface to callers; they exist so the downgrade is a visible,
/// testable decision instead of an implicit side effect of error swallowing.
#[derive(Debug)]
pub enum RemoteFailure {
  /// No authenticated session; remote operations are skipped, not failed.
  NoSession,
  /// The backend errored during list/read/write/remove.
  Unavailable(StoreError),
  /// The listed "latest" object vanished before it could be read.
  VersionRace,
  /// Fetched bytes were not a valid document.
  MalformedDocument(serde_json::Error),
}

impl std::fmt::Display for RemoteFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RemoteFailure::NoSession => write!(f, "no authenticated session"),
      RemoteFailure::Unavailable(e) => write!(f, "remote unavailable: {}", e),
      RemoteFailure::VersionRace => write!(f, "listed version vanished before read"),
      RemoteFailure::MalformedDocument(e) => write!(f, "fetched document malformed: {}", e),
    }
  }
}

/// Caller-facing error. Remote failures never appear here.
#[derive(Debug, Error)]
pub enum SyncError {
  #[error("local storage failure: {0}")]
  LocalStorage(#[from] CacheError),
}

pub type SyncResult<T> = Result<T, SyncError>;
