//! Version reconciler: pulls remote changes into the local cache.
//!
//! One pass per explicit request, per `(owner, key)`:
//! list latest → compare against the local marker → notify the observer →
//! fetch → commit. The common case (marker equal) costs one list call and
//! transfers nothing. Passes for the same key are serialized so a key is
//! never double-fetched concurrently; different keys reconcile freely in
//! parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::cache::{LocalCache, LocalStore};
use crate::error::{RemoteFailure, SyncResult};
use crate::key::{LogicalKey, OwnerId};
use crate::remote::{LegacyMirror, ObjectStore, VersionedStore};
use crate::version::{VersionMarker, VersionedObject};

/// Outcome of a read or reconciliation pass.
///
/// `updated` is true only when new remote content was committed; `data` then
/// carries the new value. A "not updated" pass leaves `data` at whatever the
/// caller should keep showing (the prior local value, or nothing).
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled<T> {
  pub updated: bool,
  pub data: Option<T>,
}

impl<T> Reconciled<T> {
  pub fn updated(data: T) -> Self {
    Self {
      updated: true,
      data: Some(data),
    }
  }

  pub fn unchanged(data: Option<T>) -> Self {
    Self {
      updated: false,
      data,
    }
  }
}

/// Signal that a requester no longer cares about an in-flight pass.
///
/// Checked after each suspension point; in-flight network calls are allowed
/// to complete, but a cancelled pass commits nothing and reports unchanged.
#[derive(Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

/// Compares local version markers against the remote store and fetches on
/// mismatch. Not continuously polled; runs only on explicit request.
pub struct Reconciler<C: LocalStore, S: ObjectStore> {
  cache: LocalCache<C>,
  store: Arc<VersionedStore<S>>,
  mirror: LegacyMirror<S>,
  /// Per-key pass serialization, shared across clones.
  in_flight: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<C: LocalStore, S: ObjectStore + 'static> Reconciler<C, S> {
  pub fn new(
    cache: LocalCache<C>,
    store: Arc<VersionedStore<S>>,
    mirror: LegacyMirror<S>,
  ) -> Self {
    Self {
      cache,
      store,
      mirror,
      in_flight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  fn key_lock(&self, owner: &OwnerId, key: &LogicalKey) -> Arc<tokio::sync::Mutex<()>> {
    let mut map = match self.in_flight.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    map
      .entry(crate::key::local_key(owner, key))
      .or_default()
      .clone()
  }

  /// Reconcile the blob cached for `(owner, key)` against the remote store.
  ///
  /// `on_remote_diff` fires at most once per pass, before the fetch begins,
  /// so the caller can surface a loading state. Only a local cache failure
  /// is an error; every remote problem reports as unchanged.
  pub async fn reconcile_blob<F>(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    cancel: &CancelToken,
    on_remote_diff: F,
  ) -> SyncResult<Reconciled<Bytes>>
  where
    F: FnOnce(),
  {
    let lock = self.key_lock(owner, key);
    let _guard = lock.lock().await;

    let fetched = match self.fetch_if_newer(owner, key, cancel, on_remote_diff).await? {
      Ok(fetched) => fetched,
      Err(failure) => {
        self.report_unchanged(owner, key, failure);
        return Ok(Reconciled::unchanged(
          self.cache.get(owner, key)?.map(Bytes::from),
        ));
      }
    };

    let Some((bytes, latest)) = fetched else {
      return Ok(Reconciled::unchanged(
        self.cache.get(owner, key)?.map(Bytes::from),
      ));
    };

    self.cache.set(owner, key, &bytes)?;
    self
      .cache
      .set_marker(owner, key, &VersionMarker::new(latest.path))?;
    self.spawn_mirror(owner, key, bytes.clone(), &latest.content_type);
    Ok(Reconciled::updated(bytes))
  }

  /// JSON variant: identical state machine, but the fetched bytes must parse
  /// before anything is committed. A parse failure preserves the prior local
  /// document and reports unchanged.
  pub async fn reconcile_json<T, F>(
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
    let lock = self.key_lock(owner, key);
    let _guard = lock.lock().await;

    let fetched = match self.fetch_if_newer(owner, key, cancel, on_remote_diff).await? {
      Ok(fetched) => fetched,
      Err(failure) => {
        self.report_unchanged(owner, key, failure);
        return Ok(Reconciled::unchanged(self.local_json(owner, key)?));
      }
    };

    let Some((bytes, latest)) = fetched else {
      return Ok(Reconciled::unchanged(self.local_json(owner, key)?));
    };

    let parsed: T = match serde_json::from_slice(&bytes) {
      Ok(parsed) => parsed,
      Err(e) => {
        self.report_unchanged(owner, key, RemoteFailure::MalformedDocument(e));
        return Ok(Reconciled::unchanged(self.local_json(owner, key)?));
      }
    };

    self.cache.set(owner, key, &bytes)?;
    self
      .cache
      .set_marker(owner, key, &VersionMarker::new(latest.path))?;
    self.spawn_mirror(owner, key, bytes, &latest.content_type);
    Ok(Reconciled::updated(parsed))
  }

  /// The shared list/compare/notify/fetch half of a pass.
  ///
  /// `Ok(Ok(None))` means "nothing newer" (absent remote, equal marker, or
  /// cancellation); `Ok(Ok(Some(..)))` carries fetched bytes and the listed
  /// object ready to commit; `Ok(Err(failure))` names a downgraded remote
  /// problem.
  async fn fetch_if_newer<F>(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    cancel: &CancelToken,
    on_remote_diff: F,
  ) -> SyncResult<Result<Option<(Bytes, VersionedObject)>, RemoteFailure>>
  where
    F: FnOnce(),
  {
    let Some(latest) = self.store.list_latest(owner, key).await else {
      return Ok(Ok(None));
    };
    if cancel.is_cancelled() {
      return Ok(Ok(None));
    }

    let marker = self.cache.marker(owner, key)?;
    if marker.as_ref().map(VersionMarker::path) == Some(latest.path.as_str()) {
      return Ok(Ok(None));
    }

    on_remote_diff();

    let Some(bytes) = self.store.read(&latest.path).await else {
      // The listed object vanished between list and read. Benign race; the
      // existing local value stays.
      return Ok(Err(RemoteFailure::VersionRace));
    };
    if cancel.is_cancelled() {
      return Ok(Ok(None));
    }

    Ok(Ok(Some((bytes, latest))))
  }

  /// Refresh the legacy mirror from freshly committed bytes, detached, so a
  /// read-only device still keeps the fixed path current for legacy readers.
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

  fn local_json<T: DeserializeOwned>(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
  ) -> SyncResult<Option<T>> {
    let Some(bytes) = self.cache.get(owner, key)? else {
      return Ok(None);
    };
    Ok(serde_json::from_slice(&bytes).ok())
  }

  fn report_unchanged(&self, owner: &OwnerId, key: &LogicalKey, failure: RemoteFailure) {
    tracing::warn!(owner = %owner, key = %key, %failure, "reconciliation pass downgraded to unchanged");
  }
}

impl<C: LocalStore, S: ObjectStore> Clone for Reconciler<C, S> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      store: Arc::clone(&self.store),
      mirror: self.mirror.clone(),
      in_flight: Arc::clone(&self.in_flight),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStore;
  use crate::remote::MemoryObjectStore;
  use std::sync::atomic::AtomicUsize;

  struct Rig {
    cache: LocalCache<SqliteStore>,
    store: Arc<VersionedStore<MemoryObjectStore>>,
    reconciler: Reconciler<SqliteStore, MemoryObjectStore>,
  }

  fn rig() -> Rig {
    let cache = LocalCache::new(SqliteStore::open_in_memory().unwrap());
    let backend = Arc::new(MemoryObjectStore::new());
    let store = Arc::new(VersionedStore::new(Arc::clone(&backend)));
    let mirror = LegacyMirror::new(backend, true);
    let reconciler = Reconciler::new(cache.clone(), Arc::clone(&store), mirror);
    Rig {
      cache,
      store,
      reconciler,
    }
  }

  fn owner() -> OwnerId {
    OwnerId::new("u1")
  }

  #[tokio::test]
  async fn no_remote_data_reports_unchanged() {
    let rig = rig();
    let key = LogicalKey::new("bg");
    let result = rig
      .reconciler
      .reconcile_blob(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(!result.updated);
    assert_eq!(result.data, None);
  }

  #[tokio::test]
  async fn reconciliation_is_idempotent() {
    let rig = rig();
    let key = LogicalKey::new("bg");
    rig
      .store
      .write(&owner(), &key, Bytes::from_static(b"v1"), "image/png")
      .await
      .unwrap();

    let first = rig
      .reconciler
      .reconcile_blob(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(first.updated);
    assert_eq!(first.data.as_deref(), Some(b"v1".as_ref()));

    // No intervening remote write: second pass must be a cheap no-op.
    let second = rig
      .reconciler
      .reconcile_blob(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(!second.updated);
    assert_eq!(second.data.as_deref(), Some(b"v1".as_ref()));
    assert_eq!(
      rig.cache.get(&owner(), &key).unwrap().as_deref(),
      Some(b"v1".as_ref())
    );
  }

  #[tokio::test]
  async fn picks_up_newest_version_only() {
    let rig = rig();
    let key = LogicalKey::new("bg");
    rig
      .store
      .write(&owner(), &key, Bytes::from_static(b"v1"), "image/png")
      .await
      .unwrap();
    rig
      .store
      .write(&owner(), &key, Bytes::from_static(b"v2"), "image/png")
      .await
      .unwrap();

    let result = rig
      .reconciler
      .reconcile_blob(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(result.updated);
    assert_eq!(result.data.as_deref(), Some(b"v2".as_ref()));
  }

  #[tokio::test]
  async fn observer_fires_once_and_only_on_diff() {
    let rig = rig();
    let key = LogicalKey::new("bg");
    rig
      .store
      .write(&owner(), &key, Bytes::from_static(b"v1"), "image/png")
      .await
      .unwrap();

    let notified = AtomicUsize::new(0);
    rig
      .reconciler
      .reconcile_blob(&owner(), &key, &CancelToken::new(), || {
        notified.fetch_add(1, Ordering::SeqCst);
      })
      .await
      .unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    // Marker now equal: no notification on the follow-up pass.
    rig
      .reconciler
      .reconcile_blob(&owner(), &key, &CancelToken::new(), || {
        notified.fetch_add(1, Ordering::SeqCst);
      })
      .await
      .unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn vanished_object_keeps_local_value() {
    let rig = rig();
    let key = LogicalKey::new("bg");
    rig.cache.set(&owner(), &key, b"local").unwrap();
    rig
      .store
      .write(&owner(), &key, Bytes::from_static(b"remote"), "image/png")
      .await
      .unwrap();

    // Listed, then gone before the read.
    rig.store.backend().set_vanish_on_read(true);
    let result = rig
      .reconciler
      .reconcile_blob(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();

    assert!(!result.updated);
    assert_eq!(result.data.as_deref(), Some(b"local".as_ref()));
    assert_eq!(
      rig.cache.get(&owner(), &key).unwrap().as_deref(),
      Some(b"local".as_ref())
    );
    assert_eq!(rig.cache.marker(&owner(), &key).unwrap(), None);
  }

  #[tokio::test]
  async fn malformed_json_preserves_cache() {
    let rig = rig();
    let key = LogicalKey::new("layout_en");
    rig.cache.set(&owner(), &key, br#"{"mode":"template"}"#).unwrap();
    rig
      .store
      .write(
        &owner(),
        &key,
        Bytes::from_static(b"{not json"),
        "application/json",
      )
      .await
      .unwrap();

    let result: Reconciled<serde_json::Value> = rig
      .reconciler
      .reconcile_json(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();

    assert!(!result.updated);
    assert_eq!(result.data, Some(serde_json::json!({"mode": "template"})));
    assert_eq!(
      rig.cache.get(&owner(), &key).unwrap().as_deref(),
      Some(br#"{"mode":"template"}"#.as_ref())
    );
    // The bad fetch must not advance the marker either.
    assert_eq!(rig.cache.marker(&owner(), &key).unwrap(), None);
  }

  #[tokio::test]
  async fn valid_json_commits_value_and_marker() {
    let rig = rig();
    let key = LogicalKey::new("layout_en");
    let obj = rig
      .store
      .write(
        &owner(),
        &key,
        Bytes::from(serde_json::to_vec(&serde_json::json!({"mode": "custom"})).unwrap()),
        "application/json",
      )
      .await
      .unwrap();

    let result: Reconciled<serde_json::Value> = rig
      .reconciler
      .reconcile_json(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();

    assert!(result.updated);
    assert_eq!(result.data, Some(serde_json::json!({"mode": "custom"})));
    assert_eq!(
      rig.cache.marker(&owner(), &key).unwrap(),
      Some(VersionMarker::new(obj.path))
    );
  }

  #[tokio::test]
  async fn cancelled_pass_commits_nothing() {
    let rig = rig();
    let key = LogicalKey::new("bg");
    rig
      .store
      .write(&owner(), &key, Bytes::from_static(b"v1"), "image/png")
      .await
      .unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let result = rig
      .reconciler
      .reconcile_blob(&owner(), &key, &cancel, || {})
      .await
      .unwrap();

    assert!(!result.updated);
    assert_eq!(rig.cache.get(&owner(), &key).unwrap(), None);
    assert_eq!(rig.cache.marker(&owner(), &key).unwrap(), None);
  }

  #[tokio::test]
  async fn different_keys_reconcile_concurrently() {
    let rig = rig();
    let key_a = LogicalKey::new("a");
    let key_b = LogicalKey::new("b");
    rig
      .store
      .write(&owner(), &key_a, Bytes::from_static(b"a"), "image/png")
      .await
      .unwrap();
    rig
      .store
      .write(&owner(), &key_b, Bytes::from_static(b"b"), "image/png")
      .await
      .unwrap();

    let owner = owner();
    let cancel_a = CancelToken::new();
    let cancel_b = CancelToken::new();
    let (ra, rb) = tokio::join!(
      rig.reconciler.reconcile_blob(&owner, &key_a, &cancel_a, || {}),
      rig.reconciler.reconcile_blob(&owner, &key_b, &cancel_b, || {}),
    );
    assert!(ra.unwrap().updated);
    assert!(rb.unwrap().updated);
  }

  #[tokio::test]
  async fn same_key_passes_are_serialized() {
    let rig = rig();
    let key = LogicalKey::new("bg");
    rig
      .store
      .write(&owner(), &key, Bytes::from_static(b"v1"), "image/png")
      .await
      .unwrap();

    let owner = owner();
    let cancel = CancelToken::new();
    let notified = AtomicUsize::new(0);
    let (ra, rb) = tokio::join!(
      rig.reconciler.reconcile_blob(&owner, &key, &cancel, || {
        notified.fetch_add(1, Ordering::SeqCst);
      }),
      rig.reconciler.reconcile_blob(&owner, &key, &cancel, || {
        notified.fetch_add(1, Ordering::SeqCst);
      }),
    );

    // One pass commits; the other, serialized behind it, finds the marker
    // already equal and fetches nothing.
    let (ra, rb) = (ra.unwrap(), rb.unwrap());
    assert!(ra.updated != rb.updated);
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(
      rig.cache.get(&owner, &key).unwrap().as_deref(),
      Some(b"v1".as_ref())
    );
  }

  #[tokio::test]
  async fn successful_fetch_repopulates_the_legacy_mirror() {
    let rig = rig();
    let key = LogicalKey::new("bg");
    // A version written by another device; this device only reads.
    rig
      .store
      .write(&owner(), &key, Bytes::from_static(b"remote"), "image/png")
      .await
      .unwrap();

    let result = rig
      .reconciler
      .reconcile_blob(&owner(), &key, &CancelToken::new(), || {})
      .await
      .unwrap();
    assert!(result.updated);

    // The mirror task is detached; give it a moment.
    for _ in 0..50 {
      if rig.store.backend().raw_get("u1/bg").is_some() {
        break;
      }
      tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(rig.store.backend().raw_get("u1/bg").unwrap().as_ref(), b"remote");
  }
}
