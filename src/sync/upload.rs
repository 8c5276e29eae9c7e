//! Upload pipeline: local-first writes with optimistic remote versioning.
//!
//! Order per save: local cache write (the floor guarantee; its failure is
//! the only one callers see), then a remote versioned write (failure keeps
//! the local copy and leaves the marker untouched), then a fire-and-forget
//! legacy mirror upsert. Local and remote writes are not atomic with each
//! other; a crash in between leaves local ahead of remote, which the next
//! successful save naturally repairs. A failed remote write is never
//! retried from inside this layer.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::cache::{LocalCache, LocalStore};
use crate::error::{CacheError, RemoteFailure, SyncResult};
use crate::key::{LogicalKey, OwnerId};
use crate::remote::{LegacyMirror, ObjectStore, VersionedStore};
use crate::session::SessionProvider;
use crate::version::VersionMarker;

/// Result of a save: the value is durably local; `marker` reports whether a
/// new remote version was created (`None` means local only).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
  pub marker: Option<VersionMarker>,
}

impl SaveOutcome {
  pub fn is_local_only(&self) -> bool {
    self.marker.is_none()
  }
}

/// Accepts new values and runs them through cache, versioned store, and
/// mirror.
pub struct UploadPipeline<C: LocalStore, S: ObjectStore> {
  cache: LocalCache<C>,
  store: Arc<VersionedStore<S>>,
  mirror: LegacyMirror<S>,
  session: Arc<dyn SessionProvider>,
}

impl<C: LocalStore, S: ObjectStore + 'static> UploadPipeline<C, S> {
  pub fn new(
    cache: LocalCache<C>,
    store: Arc<VersionedStore<S>>,
    mirror: LegacyMirror<S>,
    session: Arc<dyn SessionProvider>,
  ) -> Self {
    Self {
      cache,
      store,
      mirror,
      session,
    }
  }

  /// Save a binary value for `(owner, key)`.
  pub async fn save_blob(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    bytes: Bytes,
    content_type: &str,
  ) -> SyncResult<SaveOutcome> {
    // Local durability first. Failing here fails the whole save.
    self.cache.set(owner, key, &bytes)?;

    if !self.session.is_authenticated(owner) {
      tracing::debug!(owner = %owner, key = %key, failure = %RemoteFailure::NoSession, "save kept local only");
      return Ok(SaveOutcome { marker: None });
    }

    let object = match self.store.write(owner, key, bytes.clone(), content_type).await {
      Ok(object) => object,
      Err(e) => {
        // The value is durably local; the marker stays untouched so a later
        // pull-only reconciliation is not misled.
        tracing::warn!(owner = %owner, key = %key, failure = %RemoteFailure::Unavailable(e), "remote write failed, save kept local only");
        return Ok(SaveOutcome { marker: None });
      }
    };

    let marker = VersionMarker::new(object.path);
    self.cache.set_marker(owner, key, &marker)?;
    self.spawn_mirror(owner, key, bytes, content_type);

    Ok(SaveOutcome {
      marker: Some(marker),
    })
  }

  /// Save a JSON document for `(owner, key)`.
  pub async fn save_json<T: Serialize>(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    document: &T,
  ) -> SyncResult<SaveOutcome> {
    let bytes = serde_json::to_vec(document).map_err(CacheError::Serialize)?;
    self
      .save_blob(owner, key, Bytes::from(bytes), "application/json")
      .await
  }

  /// Kick off the legacy mirror upsert as a detached task. The handle (and
  /// with it the result) is dropped on purpose: the primary save already
  /// succeeded and must not observe mirror failures.
  fn spawn_mirror(&self, owner: &OwnerId, key: &LogicalKey, bytes: Bytes, content_type: &str) {
    if !self.mirror.enabled() {
      return;
    }

    let mirror = self.mirror.clone();
    let owner = owner.clone();
    let key = key.clone();
    let content_type = content_type.to_string();
    tokio::spawn(async move {
      mirror.upsert(&owner, &key, bytes, &content_type).await;
    });
  }
}

impl<C: LocalStore, S: ObjectStore> Clone for UploadPipeline<C, S> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      store: Arc::clone(&self.store),
      mirror: self.mirror.clone(),
      session: Arc::clone(&self.session),
    }
  }
}
