//! Signed-access provider: time-limited URLs for streaming large assets
//! directly from storage, without materializing bytes locally.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::key::{self, LogicalKey, OwnerId};

use super::backend::ObjectStore;
use super::mirror::LegacyMirror;
use super::versioned::VersionedStore;

/// Issues short-lived direct-access URLs for remote assets.
///
/// Resolution order: the latest versioned object, then the legacy fixed path
/// (only while legacy support is enabled), then absent. Callers must not
/// hold a URL beyond its TTL.
pub struct SignedAccess<S: ObjectStore> {
  store: Arc<VersionedStore<S>>,
  mirror: LegacyMirror<S>,
}

impl<S: ObjectStore> SignedAccess<S> {
  pub fn new(store: Arc<VersionedStore<S>>, mirror: LegacyMirror<S>) -> Self {
    Self { store, mirror }
  }

  /// A streamable URL for the current content of `(owner, key)`, if any.
  pub async fn streamable_url(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    ttl: Duration,
  ) -> Option<Url> {
    if let Some(latest) = self.store.list_latest(owner, key).await {
      match self.store.backend().signed_url(&latest.path, ttl).await {
        Ok(url) => return Some(url),
        Err(e) => {
          tracing::debug!(path = %latest.path, error = %e, "signing latest version failed");
        }
      }
    }

    // The legacy path is only worth probing while legacy mirroring is on;
    // otherwise it is known never to exist.
    if self.mirror.enabled() {
      let legacy = key::legacy_remote_path(owner, key);
      match self.store.backend().signed_url(&legacy, ttl).await {
        Ok(url) => return Some(url),
        Err(e) => {
          tracing::debug!(path = %legacy, error = %e, "signing legacy path failed");
        }
      }
    }

    None
  }
}

impl<S: ObjectStore> Clone for SignedAccess<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      mirror: self.mirror.clone(),
    }
  }
}
