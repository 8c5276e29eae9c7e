//! Object storage backend trait.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::error::StoreError;

/// One object as reported by a folder listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
  /// Name within the listed folder (no folder prefix).
  pub name: String,
  pub content_type: Option<String>,
  pub size_bytes: Option<u64>,
}

/// Path-addressed object storage with folder listing and signed URLs.
///
/// Implementations are plain adapters: they report failures as typed
/// [`StoreError`]s and make no policy decisions. Degrading errors to absence
/// happens above, in the versioned store.
pub trait ObjectStore: Send + Sync {
  /// Store `bytes` at `path`. With `upsert` false an existing object at the
  /// same path is an error; with `upsert` true it is overwritten.
  fn put(
    &self,
    path: &str,
    bytes: Bytes,
    content_type: &str,
    upsert: bool,
  ) -> impl Future<Output = Result<(), StoreError>> + Send;

  /// Read the object at exactly `path`.
  fn get(&self, path: &str) -> impl Future<Output = Result<Bytes, StoreError>> + Send;

  /// List the objects directly under `folder`.
  fn list(&self, folder: &str) -> impl Future<Output = Result<Vec<ObjectInfo>, StoreError>> + Send;

  /// Delete the object at `path`.
  fn delete(&self, path: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

  /// Issue a time-limited URL for direct reads of `path`.
  fn signed_url(
    &self,
    path: &str,
    ttl: Duration,
  ) -> impl Future<Output = Result<Url, StoreError>> + Send;
}
