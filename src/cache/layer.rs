//! Owner-scoped cache layer over a raw local store.
//!
//! Adds the `"{owner}__{key}"` namespacing, version marker bookkeeping, and
//! the lazy migration of pre-versioning (non-owner-scoped) entries.

use std::sync::Arc;

use crate::error::CacheError;
use crate::key::{self, LogicalKey, OwnerId};
use crate::version::VersionMarker;

use super::store::LocalStore;

/// Local cache scoped by owner identity.
///
/// The single owner of cached entries: the sync engine and upload pipeline
/// mutate them only through this interface.
pub struct LocalCache<S: LocalStore> {
  store: Arc<S>,
}

impl<S: LocalStore> LocalCache<S> {
  pub fn new(store: S) -> Self {
    Self {
      store: Arc::new(store),
    }
  }

  /// Get the cached value for `(owner, key)`.
  ///
  /// Runs the one-time legacy migration lazily: a value found under the
  /// global pre-owner-scoping key, with nothing yet under the owner-scoped
  /// key, is copied over and the global key deleted. Repeating the migration
  /// is safe; deleting an already-deleted legacy key is a no-op.
  pub fn get(&self, owner: &OwnerId, key: &LogicalKey) -> Result<Option<Vec<u8>>, CacheError> {
    let scoped = key::local_key(owner, key);
    if let Some(value) = self.store.get(&scoped)? {
      return Ok(Some(value));
    }

    let legacy = key::legacy_local_key(key);
    if let Some(value) = self.store.get(&legacy)? {
      self.store.set(&scoped, &value)?;
      self.store.delete(&legacy)?;
      tracing::debug!(owner = %owner, key = %key, "migrated legacy cache entry");
      return Ok(Some(value));
    }

    Ok(None)
  }

  /// Store the value for `(owner, key)`.
  pub fn set(&self, owner: &OwnerId, key: &LogicalKey, value: &[u8]) -> Result<(), CacheError> {
    self.store.set(&key::local_key(owner, key), value)
  }

  /// Delete the value for `(owner, key)`. No-op if absent.
  pub fn delete(&self, owner: &OwnerId, key: &LogicalKey) -> Result<(), CacheError> {
    self.store.delete(&key::local_key(owner, key))
  }

  /// Get the version marker recorded for `(owner, key)`.
  pub fn marker(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
  ) -> Result<Option<VersionMarker>, CacheError> {
    let raw = self.store.get(&key::marker_key(owner, key))?;
    Ok(raw.map(|bytes| VersionMarker::new(String::from_utf8_lossy(&bytes).into_owned())))
  }

  /// Record `marker` as the newest confirmed remote version.
  pub fn set_marker(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    marker: &VersionMarker,
  ) -> Result<(), CacheError> {
    self
      .store
      .set(&key::marker_key(owner, key), marker.path().as_bytes())
  }

  /// Delete the version marker for `(owner, key)`. No-op if absent.
  pub fn delete_marker(&self, owner: &OwnerId, key: &LogicalKey) -> Result<(), CacheError> {
    self.store.delete(&key::marker_key(owner, key))
  }

  /// Remove the cached entry and its marker.
  pub fn remove_entry(&self, owner: &OwnerId, key: &LogicalKey) -> Result<(), CacheError> {
    self.delete(owner, key)?;
    self.delete_marker(owner, key)
  }

  /// Remove every cached entry and marker belonging to `owner`.
  pub fn reset_owner(&self, owner: &OwnerId) -> Result<(), CacheError> {
    self.store.clear_prefix(&key::owner_prefix(owner))
  }

  /// Remove everything, all owners included.
  pub fn clear_all(&self) -> Result<(), CacheError> {
    self.store.clear_all()
  }
}

impl<S: LocalStore> Clone for LocalCache<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::store::SqliteStore;

  fn cache() -> LocalCache<SqliteStore> {
    LocalCache::new(SqliteStore::open_in_memory().unwrap())
  }

  fn owner() -> OwnerId {
    OwnerId::new("u1")
  }

  #[test]
  fn values_are_scoped_by_owner() {
    let cache = cache();
    let key = LogicalKey::new("bg");
    cache.set(&owner(), &key, b"red").unwrap();

    assert_eq!(
      cache.get(&owner(), &key).unwrap().as_deref(),
      Some(b"red".as_ref())
    );
    assert_eq!(cache.get(&OwnerId::new("u2"), &key).unwrap(), None);
  }

  #[test]
  fn legacy_migration_is_idempotent() {
    let cache = cache();
    let key = LogicalKey::new("bg");

    // Simulate a pre-versioning install that wrote under the bare key.
    cache.store.set("bg", b"legacy").unwrap();

    // First access migrates and removes the global key.
    assert_eq!(
      cache.get(&owner(), &key).unwrap().as_deref(),
      Some(b"legacy".as_ref())
    );
    assert_eq!(cache.store.get("bg").unwrap(), None);

    // Second access still sees the value under the scoped key.
    assert_eq!(
      cache.get(&owner(), &key).unwrap().as_deref(),
      Some(b"legacy".as_ref())
    );
  }

  #[test]
  fn scoped_value_wins_over_legacy() {
    let cache = cache();
    let key = LogicalKey::new("bg");
    cache.store.set("bg", b"legacy").unwrap();
    cache.set(&owner(), &key, b"scoped").unwrap();

    assert_eq!(
      cache.get(&owner(), &key).unwrap().as_deref(),
      Some(b"scoped".as_ref())
    );
    // The legacy key is left alone when the scoped key already exists.
    assert!(cache.store.get("bg").unwrap().is_some());
  }

  #[test]
  fn marker_round_trip() {
    let cache = cache();
    let key = LogicalKey::new("bg");
    assert_eq!(cache.marker(&owner(), &key).unwrap(), None);

    let marker = VersionMarker::new("u1/bg/1700000000-bg.png");
    cache.set_marker(&owner(), &key, &marker).unwrap();
    assert_eq!(cache.marker(&owner(), &key).unwrap(), Some(marker));

    cache.delete_marker(&owner(), &key).unwrap();
    assert_eq!(cache.marker(&owner(), &key).unwrap(), None);
  }

  #[test]
  fn remove_entry_drops_value_and_marker() {
    let cache = cache();
    let key = LogicalKey::new("bg");
    cache.set(&owner(), &key, b"v").unwrap();
    cache
      .set_marker(&owner(), &key, &VersionMarker::new("u1/bg/1-x"))
      .unwrap();

    cache.remove_entry(&owner(), &key).unwrap();
    assert_eq!(cache.get(&owner(), &key).unwrap(), None);
    assert_eq!(cache.marker(&owner(), &key).unwrap(), None);
  }

  #[test]
  fn reset_owner_leaves_other_owners_intact() {
    let cache = cache();
    let key = LogicalKey::new("bg");
    let other = OwnerId::new("u2");
    cache.set(&owner(), &key, b"mine").unwrap();
    cache.set(&other, &key, b"theirs").unwrap();

    cache.reset_owner(&owner()).unwrap();
    assert_eq!(cache.get(&owner(), &key).unwrap(), None);
    assert_eq!(
      cache.get(&other, &key).unwrap().as_deref(),
      Some(b"theirs".as_ref())
    );
  }
}
