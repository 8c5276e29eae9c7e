//! Remote versioned store: one folder per logical key, one immutable object
//! per write.
//!
//! Every error from the backend degrades to absence here, with one
//! exception: the initiating `write` call surfaces its failure so the upload
//! pipeline can decide what to do with the optimistic local copy.

use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use chrono::Utc;

use crate::error::StoreError;
use crate::key::{self, LogicalKey, OwnerId};
use crate::version::{VersionStamp, VersionedObject};

use super::backend::ObjectStore;

/// Versioned object store over a path-addressed backend.
pub struct VersionedStore<S: ObjectStore> {
  backend: Arc<S>,
  /// Last allocated stamp, so same-second writes get a disambiguating
  /// sequence number and a clock stepping backwards cannot reissue an
  /// earlier stamp.
  last_stamp: Mutex<VersionStamp>,
}

impl<S: ObjectStore> VersionedStore<S> {
  pub fn new(backend: Arc<S>) -> Self {
    Self {
      backend,
      last_stamp: Mutex::new(VersionStamp::new(0, 0)),
    }
  }

  pub fn backend(&self) -> &Arc<S> {
    &self.backend
  }

  /// Allocate a stamp strictly greater than every stamp this process has
  /// already issued.
  fn next_stamp(&self) -> VersionStamp {
    let now = Utc::now().timestamp();
    let mut last = match self.last_stamp.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };

    let stamp = if now > last.seconds {
      VersionStamp::new(now, 0)
    } else if last.seq >= 999 {
      // The sequence pad is three digits wide; past it, roll into the next
      // second so rendered names keep sorting in creation order.
      VersionStamp::new(last.seconds + 1, 0)
    } else {
      // Same second, or the clock went backwards: keep the old second and
      // bump the sequence so ordering stays strict.
      VersionStamp::new(last.seconds, last.seq + 1)
    };
    *last = stamp;
    stamp
  }

  /// Write a new immutable version of `(owner, key)`.
  ///
  /// Never overwrites: the object name carries a fresh stamp, so a purely
  /// lexicographic sort of the folder yields creation order. Another writer
  /// landing on the same stamp (same second, different process) surfaces as
  /// an existence conflict, answered by bumping the sequence and retrying.
  /// This is the one remote call whose failure propagates.
  pub async fn write(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
    bytes: Bytes,
    content_type: &str,
  ) -> Result<VersionedObject, StoreError> {
    let folder = key::remote_folder(owner, key);
    let name = key::version_filename(key, content_type);
    let size_bytes = bytes.len() as u64;

    let mut attempts = 0;
    loop {
      let stamp = self.next_stamp();
      let path = format!("{}/{}", folder, stamp.filename(&name));

      match self.backend.put(&path, bytes.clone(), content_type, false).await {
        Ok(()) => {
          return Ok(VersionedObject {
            path,
            stamp,
            content_type: content_type.to_string(),
            size_bytes,
          });
        }
        Err(StoreError::AlreadyExists(_)) if attempts < 8 => {
          attempts += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }

  /// The newest version of `(owner, key)`, or `None` when the folder is
  /// empty, listing is denied, or the backend is unreachable.
  ///
  /// An owner with no remote data yet is a valid state, not an error.
  pub async fn list_latest(
    &self,
    owner: &OwnerId,
    key: &LogicalKey,
  ) -> Option<VersionedObject> {
    let folder = key::remote_folder(owner, key);
    let listed = match self.backend.list(&folder).await {
      Ok(listed) => listed,
      Err(e) => {
        tracing::debug!(owner = %owner, key = %key, error = %e, "list degraded to absent");
        return None;
      }
    };

    listed
      .into_iter()
      .filter_map(|info| {
        let (stamp, _) = VersionStamp::parse(&info.name)?;
        Some(VersionedObject {
          path: format!("{}/{}", folder, info.name),
          stamp,
          content_type: info.content_type.unwrap_or_else(|| "application/octet-stream".into()),
          size_bytes: info.size_bytes.unwrap_or(0),
        })
      })
      .max_by_key(|obj| obj.stamp)
  }

  /// Read an object by exact path, independent of its "latest" status.
  /// Absence covers both a missing object and an unreachable backend.
  pub async fn read(&self, path: &str) -> Option<Bytes> {
    match self.backend.get(path).await {
      Ok(bytes) => Some(bytes),
      Err(e) => {
        if !e.is_not_found() {
          tracing::debug!(path, error = %e, "read degraded to absent");
        }
        None
      }
    }
  }

  /// Delete a batch of objects, best-effort and concurrently. A failing path
  /// never aborts deletion of the rest. Returns how many were removed.
  pub async fn remove(&self, paths: &[String]) -> usize {
    let deletes = paths.iter().map(|path| async move {
      match self.backend.delete(path).await {
        Ok(()) => true,
        Err(e) => {
          tracing::debug!(path, error = %e, "skipping failed delete");
          false
        }
      }
    });
    futures::future::join_all(deletes)
      .await
      .into_iter()
      .filter(|removed| *removed)
      .count()
  }

  /// Every version path currently listed for `(owner, key)`, oldest first.
  /// Degrades to empty on listing failure.
  pub async fn version_paths(&self, owner: &OwnerId, key: &LogicalKey) -> Vec<String> {
    let folder = key::remote_folder(owner, key);
    match self.backend.list(&folder).await {
      Ok(listed) => listed
        .into_iter()
        .map(|info| format!("{}/{}", folder, info.name))
        .collect(),
      Err(e) => {
        tracing::debug!(owner = %owner, key = %key, error = %e, "version listing degraded to empty");
        Vec::new()
      }
    }
  }
}
