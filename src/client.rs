//! Caller-facing client: the surface the editor/UI layer talks to.
//!
//! Wraps the local cache, the versioned store, the reconciler, the upload
//! pipeline, and the signed-access provider behind one handle. This is the
//! boundary where remote failures are deliberately downgraded: callers only
//! ever see a local storage error; anything remote reports as "not updated"
//! or "local only".

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::cache::{LocalCache, LocalStore, SqliteStore};
use crate::config::SyncConfig;
use crate::error::{RemoteFailure, SyncResult};
use crate::key::{LogicalKey, OwnerId};
use crate::remote::{LegacyMirror, MemoryObjectStore, ObjectStore, SignedAccess, VersionedStore};
use crate::session::{SessionProvider, StaticSession};
use crate::sync::{CancelToken, Reconciled, Reconciler, SaveOutcome, UploadPipeline};

/// Local-first, versioned asset client.
///
/// Generic over the local store `C` and the object storage backend `S`; see
/// [`SyncClient::open`] and [`SyncClient::in_memory`] for common wirings.
pub struct SyncClient<C: LocalStore, S: ObjectStore> {
  cache: LocalCache<C>,
  store: Arc<VersionedStore<S>>,
  mirror: LegacyMirror<S>,
  session: Arc<dyn SessionProvider>,
  reconciler: Reconciler<C, S>,
  upload: UploadPipeline<C, S>,
  signed: SignedAccess<S>,
}

impl SyncClient<SqliteStore, MemoryObjectStore> {
  /// Fully in-process client: in-memory SQLite and in-memory object storage.
  /// Used by tests and by previews that must not touch the network.
  pub fn in_memory() -> SyncResult<Self> {
    Ok(Self::new(
      SqliteStore::open_in_memory()?,
      Arc::new(MemoryObjectStore::new()),
      true,
      Arc::new(StaticSession::authenticated()),
    ))
  }
}

impl<S: ObjectStore + 'static> SyncClient<SqliteStore, S> {
  /// Open the on-disk cache per `config` and wire it to `backend`.
  pub fn open(
    config: &SyncConfig,
    backend: Arc<S>,
    session: Arc<dyn SessionProvider>,
  ) -> SyncResult<Self> {
    let store = match &config.cache_path {
      Some(path) => SqliteStore::open_at(path)?,
      None => SqliteStore::open()?,
    };
    Ok(Self::new(store, backend, config.legacy_mirror, session))
  }
}

impl<C: LocalStore, S: ObjectStore + 'static> SyncClient<C, S> {
  pub fn new(
    local: C,
    backend: Arc<S>,
    legacy_mirror: bool,
    session: Arc<dyn SessionProvider>,
  ) -> Self {
    let cache = LocalCache::new(local);
    let store = Arc::new(VersionedStore::new(backend.clone()));
    let mirror = LegacyMirror::new(backend, legacy_mirror);
    let reconciler = Reconciler::new(cache.clone(), Arc::clone(&store), mirror.clone());
    let upload = UploadPipeline::new(
      cache.clone(),
      Arc::clone(&store),
      mirror.clone(),
      Arc::clone(&session),
    );
    let signed = SignedAccess::new(Arc::clone(&store), mirror.clone());

    Self {
      cache,
      store,
      mirror,
      session,
      reconciler,
      upload,
      signed,
    }
  }

  /// Instant read of the last-known local value. No network.
  pub fn load_local(&self, owner: &OwnerId, key: &LogicalKey) -> SyncResult<Option<Bytes>> {
    Ok(self.cache.get(owner, key)?.map(Bytes::from))
  }

  /// Instant read of the last-known local JSON document. A locally cached
  /// document that no longer parses reads as absent rather than erroring.
  pub fn load_local_json<T: DeserializeOwned>(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
  ) -> SyncResult<Option<T>> {
    let Some(bytes) = self.cache.get(owner, key)? else {
      return Ok(None);
    };
    Ok(serde_json::from_slice(&bytes).ok())
  }

  /// Reconcile the local blob against the remote store.
  ///
  /// `on_remote_diff` fires (at most once) before any content transfer, so
  /// the caller can show a loading indicator. With no session the pass is
  /// skipped outright and the local value reported unchanged.
  pub async fn load_and_reconcile<F>(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    cancel: &CancelToken,
    on_remote_diff: F,
  ) -> SyncResult<Reconciled<Bytes>>
  where
    F: FnOnce(),
  {
    if !self.session.is_authenticated(owner) {
      tracing::debug!(owner = %owner, key = %key, failure = %RemoteFailure::NoSession, "reconciliation skipped");
      return Ok(Reconciled::unchanged(self.load_local(owner, key)?));
    }
    self
      .reconciler
      .reconcile_blob(owner, key, cancel, on_remote_diff)
      .await
  }

  /// JSON variant of [`SyncClient::load_and_reconcile`].
  pub async fn load_and_reconcile_json<T, F>(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    cancel: &CancelToken,
    on_remote_diff: F,
  ) -> SyncResult<Reconciled<T>>
  where
    T: DeserializeOwned,
    F: FnOnce(),
  {
    if !self.session.is_authenticated(owner) {
      tracing::debug!(owner = %owner, key = %key, failure = %RemoteFailure::NoSession, "reconciliation skipped");
      return Ok(Reconciled::unchanged(self.load_local_json(owner, key)?));
    }
    self
      .reconciler
      .reconcile_json(owner, key, cancel, on_remote_diff)
      .await
  }

  /// Save a binary asset. See [`UploadPipeline::save_blob`] for the
  /// durability contract.
  pub async fn save_blob(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    bytes: Bytes,
    content_type: &str,
  ) -> SyncResult<SaveOutcome> {
    self.upload.save_blob(owner, key, bytes, content_type).await
  }

  /// Save a JSON document.
  pub async fn save_json<T: Serialize>(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    document: &T,
  ) -> SyncResult<SaveOutcome> {
    self.upload.save_json(owner, key, document).await
  }

  /// Remove one key: the cached entry and marker always; the remote version
  /// folder and legacy mirror best-effort when a session exists. The legacy
  /// path is deleted regardless of the mirror switch, so an object left over
  /// from an earlier mirroring era is not orphaned.
  pub async fn remove_key(&self, owner: &OwnerId, key: &LogicalKey) -> SyncResult<()> {
    self.cache.remove_entry(owner, key)?;

    if !self.session.is_authenticated(owner) {
      return Ok(());
    }

    let mut paths = self.store.version_paths(owner, key).await;
    paths.push(crate::key::legacy_remote_path(owner, key));
    let removed = self.store.remove(&paths).await;
    tracing::debug!(owner = %owner, key = %key, removed, total = paths.len(), "removed remote objects");
    Ok(())
  }

  /// Drop every cached entry and marker for `owner`. Remote data is left in
  /// place; a later reconciliation simply re-fetches it.
  pub fn reset_owner(&self, owner: &OwnerId) -> SyncResult<()> {
    self.cache.reset_owner(owner)?;
    Ok(())
  }

  /// A time-limited URL for streaming the current remote content of
  /// `(owner, key)` directly from storage. `None` without a session or when
  /// nothing is stored remotely.
  pub async fn streamable_url(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    ttl: Duration,
  ) -> Option<Url> {
    if !self.session.is_authenticated(owner) {
      return None;
    }
    self.signed.streamable_url(owner, key, ttl).await
  }
}

impl<C: LocalStore, S: ObjectStore> Clone for SyncClient<C, S> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      store: Arc::clone(&self.store),
      mirror: self.mirror.clone(),
      session: Arc::clone(&self.session),
      reconciler: self.reconciler.clone(),
      upload: self.upload.clone(),
      signed: self.signed.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn owner() -> OwnerId {
    OwnerId::new("u1")
  }

  fn layout_key() -> LogicalKey {
    LogicalKey::new("layout_en")
  }

  #[tokio::test]
  async fn save_then_immediate_reconcile_is_unchanged() {
    let client = SyncClient::in_memory().unwrap();
    let doc = json!({"mode": "template", "templateId": "T1A"});

    let outcome = client.save_json(&owner(), &layout_key(), &doc).await.unwrap();
    assert!(outcome.marker.is_some());

    // No new remote write since the save recorded its own marker.
    let result: Reconciled<serde_json::Value> = client
      .load_and_reconcile_json(&owner(), &layout_key(), &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(!result.updated);
    assert_eq!(result.data, Some(doc));
  }

  #[tokio::test]
  async fn second_device_write_is_picked_up() {
    // Two clients sharing one backend simulate two processes of one owner.
    let backend = Arc::new(MemoryObjectStore::new());
    let first = SyncClient::new(
      SqliteStore::open_in_memory().unwrap(),
      Arc::clone(&backend),
      true,
      Arc::new(StaticSession::authenticated()),
    );
    let second = SyncClient::new(
      SqliteStore::open_in_memory().unwrap(),
      Arc::clone(&backend),
      true,
      Arc::new(StaticSession::authenticated()),
    );

    first
      .save_json(&owner(), &layout_key(), &json!({"mode": "template", "templateId": "T1A"}))
      .await
      .unwrap();
    let settled: Reconciled<serde_json::Value> = first
      .load_and_reconcile_json(&owner(), &layout_key(), &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(!settled.updated);

    second
      .save_json(&owner(), &layout_key(), &json!({"mode": "custom"}))
      .await
      .unwrap();

    let picked_up: Reconciled<serde_json::Value> = first
      .load_and_reconcile_json(&owner(), &layout_key(), &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(picked_up.updated);
    assert_eq!(picked_up.data, Some(json!({"mode": "custom"})));
  }

  #[tokio::test]
  async fn no_session_operates_local_only() {
    let backend = Arc::new(MemoryObjectStore::new());
    let client = SyncClient::new(
      SqliteStore::open_in_memory().unwrap(),
      Arc::clone(&backend),
      true,
      Arc::new(StaticSession::anonymous()),
    );
    let key = LogicalKey::new("bg");

    let outcome = client
      .save_blob(&owner(), &key, Bytes::from_static(b"pix"), "image/png")
      .await
      .unwrap();
    assert!(outcome.is_local_only());
    assert!(backend.is_empty());

    let result = client
      .load_and_reconcile(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(!result.updated);
    assert_eq!(result.data.as_deref(), Some(b"pix".as_ref()));

    assert!(client
      .streamable_url(&owner(), &key, Duration::from_secs(60))
      .await
      .is_none());
  }

  #[tokio::test]
  async fn remove_key_clears_local_and_remote() {
    let client = SyncClient::in_memory().unwrap();
    let key = LogicalKey::new("bg");
    client
      .save_blob(&owner(), &key, Bytes::from_static(b"pix"), "image/png")
      .await
      .unwrap();

    client.remove_key(&owner(), &key).await.unwrap();
    assert_eq!(client.load_local(&owner(), &key).unwrap(), None);
    assert!(client
      .load_and_reconcile(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap()
      .data
      .is_none());
  }

  #[tokio::test]
  async fn remove_key_deletes_an_orphaned_legacy_object() {
    let backend = Arc::new(MemoryObjectStore::new());
    let client = SyncClient::new(
      SqliteStore::open_in_memory().unwrap(),
      Arc::clone(&backend),
      false,
      Arc::new(StaticSession::authenticated()),
    );
    let key = LogicalKey::new("bg");
    // Left behind by an earlier install that still mirrored.
    backend.raw_put("u1/bg", Bytes::from_static(b"old"), "image/png");

    client.remove_key(&owner(), &key).await.unwrap();
    assert!(backend.is_empty());
  }

  #[tokio::test]
  async fn reset_owner_is_scoped() {
    let client = SyncClient::in_memory().unwrap();
    let other = OwnerId::new("u2");
    let key = LogicalKey::new("bg");

    client
      .save_blob(&owner(), &key, Bytes::from_static(b"mine"), "image/png")
      .await
      .unwrap();
    client
      .save_blob(&other, &key, Bytes::from_static(b"theirs"), "image/png")
      .await
      .unwrap();

    client.reset_owner(&owner()).unwrap();
    assert_eq!(client.load_local(&owner(), &key).unwrap(), None);
    assert_eq!(
      client.load_local(&other, &key).unwrap().as_deref(),
      Some(b"theirs".as_ref())
    );
  }

  #[tokio::test]
  async fn streamable_url_resolves_latest() {
    let client = SyncClient::in_memory().unwrap();
    let key = LogicalKey::new("intro");
    client
      .save_blob(&owner(), &key, Bytes::from_static(b"movie"), "video/mp4")
      .await
      .unwrap();

    let url = client
      .streamable_url(&owner(), &key, Duration::from_secs(60))
      .await
      .unwrap();
    assert!(url.path().contains("intro.mp4"));
  }
}
