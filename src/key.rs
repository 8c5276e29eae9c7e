//! Owner and key identities, plus the namespacing rules that map them onto
//! local cache keys and remote storage paths.
//!
//! Local layout: `"{owner}__{key}"`, markers at `"{owner}__{key}__remoteVersion"`.
//! Remote layout: versioned objects under the folder `"{owner}/{key}/"`, the
//! legacy mirror at the bare `"{owner}/{key}"` path.

use serde::{Deserialize, Serialize};

/// Suffix distinguishing a version marker from the value it describes.
const MARKER_SUFFIX: &str = "__remoteVersion";

/// Opaque authenticated user id. All logical keys are namespaced by it;
/// there is no cross-owner visibility.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for OwnerId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Application-defined name for one asset slot (e.g. "menu_background").
/// Opaque to this layer beyond its use in key and path derivation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalKey(String);

impl LogicalKey {
  pub fn new(key: impl Into<String>) -> Self {
    Self(key.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for LogicalKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Owner-scoped local cache key for a value.
pub fn local_key(owner: &OwnerId, key: &LogicalKey) -> String {
  format!("{}__{}", owner, key)
}

/// Local cache key for the version marker of `(owner, key)`.
pub fn marker_key(owner: &OwnerId, key: &LogicalKey) -> String {
  format!("{}__{}{}", owner, key, MARKER_SUFFIX)
}

/// Pre-owner-scoping key a legacy install may have written under.
pub fn legacy_local_key(key: &LogicalKey) -> String {
  key.as_str().to_string()
}

/// Prefix selecting every local entry (values and markers) of one owner.
pub fn owner_prefix(owner: &OwnerId) -> String {
  format!("{}__", owner)
}

/// Remote folder holding the versioned objects of `(owner, key)`.
pub fn remote_folder(owner: &OwnerId, key: &LogicalKey) -> String {
  format!("{}/{}", owner, key)
}

/// Fixed remote path of the non-versioned legacy mirror.
pub fn legacy_remote_path(owner: &OwnerId, key: &LogicalKey) -> String {
  format!("{}/{}", owner, key)
}

/// File extension for a content type, used when deriving version filenames.
pub fn extension_for(content_type: &str) -> &'static str {
  match content_type {
    "application/json" => "json",
    "image/png" => "png",
    "image/jpeg" => "jpg",
    "image/webp" => "webp",
    "image/gif" => "gif",
    "video/mp4" => "mp4",
    "video/webm" => "webm",
    _ => "bin",
  }
}

/// Filename component of a versioned object for `key`.
pub fn version_filename(key: &LogicalKey, content_type: &str) -> String {
  format!("{}.{}", key, extension_for(content_type))
}
