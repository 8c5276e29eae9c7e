//! Legacy mirror: a single fixed-path copy of the most recent write, kept
//! for readers that predate folder versioning.
//!
//! Purely best-effort. It is only touched after the primary versioned
//! operation has already succeeded, always as a spawned task whose result is
//! intentionally discarded, so a mirror failure can never block or fail the
//! primary operation.

use std::sync::Arc;

use bytes::Bytes;

use crate::key::{self, LogicalKey, OwnerId};

use super::backend::ObjectStore;

/// Maintains the non-versioned fixed-path mirror of each key.
pub struct LegacyMirror<S: ObjectStore> {
  backend: Arc<S>,
  enabled: bool,
}

impl<S: ObjectStore> LegacyMirror<S> {
  pub fn new(backend: Arc<S>, enabled: bool) -> Self {
    Self { backend, enabled }
  }

  /// Whether legacy readers are being supported at all. When false, mirror
  /// writes are no-ops and read fallbacks skip the legacy path entirely.
  pub fn enabled(&self) -> bool {
    self.enabled
  }

  /// Overwrite the fixed-path mirror for `(owner, key)`.
  pub async fn upsert(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    bytes: Bytes,
    content_type: &str,
  ) {
    if !self.enabled {
      return;
    }

    let path = key::legacy_remote_path(owner, key);
    if let Err(e) = self.backend.put(&path, bytes, content_type, true).await {
      tracing::debug!(path, error = %e, "legacy mirror upsert failed");
    }
  }
}

impl<S: ObjectStore> Clone for LegacyMirror<S> {
  fn clone(&self) -> Self {
    Self {
      backend: Arc::clone(&self.backend),
      enabled: self.enabled,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::remote::memory::MemoryObjectStore;

  #[tokio::test]
  async fn upsert_overwrites_the_fixed_path() {
    let backend = Arc::new(MemoryObjectStore::new());
    let mirror = LegacyMirror::new(Arc::clone(&backend), true);
    let owner = OwnerId::new("u1");
    let key = LogicalKey::new("bg");

    mirror
      .upsert(&owner, &key, Bytes::from_static(b"v1"), "image/png")
      .await;
    mirror
      .upsert(&owner, &key, Bytes::from_static(b"v2"), "image/png")
      .await;

    assert_eq!(backend.raw_get("u1/bg").unwrap().as_ref(), b"v2");
    assert_eq!(backend.len(), 1);
  }

  #[tokio::test]
  async fn disabled_mirror_writes_nothing() {
    let backend = Arc::new(MemoryObjectStore::new());
    let mirror = LegacyMirror::new(Arc::clone(&backend), false);

    mirror
      .upsert(
        &OwnerId::new("u1"),
        &LogicalKey::new("bg"),
        Bytes::from_static(b"v1"),
        "image/png",
      )
      .await;
    assert!(backend.is_empty());
  }

  #[tokio::test]
  async fn backend_failure_is_swallowed() {
    let backend = Arc::new(MemoryObjectStore::new());
    backend.set_fail_writes(true);
    let mirror = LegacyMirror::new(Arc::clone(&backend), true);

    // Must not panic or error.
    mirror
      .upsert(
        &OwnerId::new("u1"),
        &LogicalKey::new("bg"),
        Bytes::from_static(b"v1"),
        "image/png",
      )
      .await;
  }
}
