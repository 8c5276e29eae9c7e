//! In-memory object storage backend.
//!
//! Used by tests and by offline wiring. Carries fault-injection toggles so
//! the failure paths of the sync engine can be exercised deterministically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::StoreError;

use super::backend::{ObjectInfo, ObjectStore};

#[derive(Clone)]
struct StoredObject {
  bytes: Bytes,
  content_type: String,
}

/// Object store over a `BTreeMap` keyed by full path.
#[derive(Default)]
pub struct MemoryObjectStore {
  objects: Mutex<BTreeMap<String, StoredObject>>,
  /// When set, every `put` fails with `Unavailable`.
  fail_writes: AtomicBool,
  /// When set, every `list` fails with `Denied`.
  fail_lists: AtomicBool,
  /// When set, every `get` reports `NotFound` without touching the map.
  /// Simulates an object deleted between list and read.
  vanish_on_read: AtomicBool,
}

impl MemoryObjectStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  pub fn set_fail_lists(&self, fail: bool) {
    self.fail_lists.store(fail, Ordering::SeqCst);
  }

  pub fn set_vanish_on_read(&self, vanish: bool) {
    self.vanish_on_read.store(vanish, Ordering::SeqCst);
  }

  /// Number of stored objects, across all folders.
  pub fn len(&self) -> usize {
    self.objects.lock().expect("object map lock").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Raw bytes at `path`, bypassing fault injection. Test helper.
  pub fn raw_get(&self, path: &str) -> Option<Bytes> {
    let objects = self.objects.lock().expect("object map lock");
    objects.get(path).map(|o| o.bytes.clone())
  }

  /// Overwrite the bytes at `path` in place, bypassing the no-overwrite
  /// rule. Test helper for simulating corrupted remote content.
  pub fn raw_put(&self, path: &str, bytes: Bytes, content_type: &str) {
    let mut objects = self.objects.lock().expect("object map lock");
    objects.insert(
      path.to_string(),
      StoredObject {
        bytes,
        content_type: content_type.to_string(),
      },
    );
  }

  fn locked(
    &self,
  ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>>, StoreError> {
    self
      .objects
      .lock()
      .map_err(|_| StoreError::Backend("object map lock poisoned".into()))
  }
}

impl ObjectStore for MemoryObjectStore {
  async fn put(
    &self,
    path: &str,
    bytes: Bytes,
    content_type: &str,
    upsert: bool,
  ) -> Result<(), StoreError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable("injected write failure".into()));
    }

    let mut objects = self.locked()?;
    if !upsert && objects.contains_key(path) {
      return Err(StoreError::AlreadyExists(path.to_string()));
    }
    objects.insert(
      path.to_string(),
      StoredObject {
        bytes,
        content_type: content_type.to_string(),
      },
    );
    Ok(())
  }

  async fn get(&self, path: &str) -> Result<Bytes, StoreError> {
    if self.vanish_on_read.load(Ordering::SeqCst) {
      return Err(StoreError::NotFound(path.to_string()));
    }

    let objects = self.locked()?;
    objects
      .get(path)
      .map(|o| o.bytes.clone())
      .ok_or_else(|| StoreError::NotFound(path.to_string()))
  }

  async fn list(&self, folder: &str) -> Result<Vec<ObjectInfo>, StoreError> {
    if self.fail_lists.load(Ordering::SeqCst) {
      return Err(StoreError::Denied("injected list failure".into()));
    }

    let prefix = format!("{}/", folder.trim_end_matches('/'));
    let objects = self.locked()?;
    let infos = objects
      .range(prefix.clone()..)
      .take_while(|(path, _)| path.starts_with(&prefix))
      .filter(|(path, _)| !path[prefix.len()..].contains('/'))
      .map(|(path, obj)| ObjectInfo {
        name: path[prefix.len()..].to_string(),
        content_type: Some(obj.content_type.clone()),
        size_bytes: Some(obj.bytes.len() as u64),
      })
      .collect();
    Ok(infos)
  }

  async fn delete(&self, path: &str) -> Result<(), StoreError> {
    let mut objects = self.locked()?;
    objects
      .remove(path)
      .map(|_| ())
      .ok_or_else(|| StoreError::NotFound(path.to_string()))
  }

  async fn signed_url(&self, path: &str, ttl: Duration) -> Result<Url, StoreError> {
    {
      let objects = self.locked()?;
      if !objects.contains_key(path) {
        return Err(StoreError::NotFound(path.to_string()));
      }
    }

    let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(expires_at.to_be_bytes());
    let token = hex::encode(hasher.finalize());

    let url = format!(
      "memory://signed/{}?token={}&expires={}",
      path, token, expires_at
    );
    Url::parse(&url).map_err(|e| StoreError::Backend(e.to_string()))
  }
}
