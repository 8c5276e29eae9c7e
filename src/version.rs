//! Sortable version identities for remote objects.
//!
//! A versioned object's filename starts with its creation stamp so that
//! ordering is storage-query-free: listing a folder and sorting names yields
//! creation order. The stamp is kept as a typed value rather than a raw
//! string so "latest" is a well-defined total order.

use serde::{Deserialize, Serialize};

/// Creation stamp of one versioned object: unix seconds plus a sequence
/// number that disambiguates writes sharing a second.
///
/// Rendered as `"1700000000"` when `seq` is zero and `"1700000000.001"`
/// otherwise. For stamps with equal-width second fields and `seq` below
/// 1000 the rendered form sorts lexicographically in `(seconds, seq)`
/// order; the allocator rolls into the next second rather than exceed the
/// three-digit pad. Comparison in code always goes through the parsed
/// value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionStamp {
  pub seconds: i64,
  pub seq: u32,
}

impl VersionStamp {
  pub fn new(seconds: i64, seq: u32) -> Self {
    Self { seconds, seq }
  }

  /// Render the filename `"{stamp}-{name}"` for this stamp.
  pub fn filename(&self, name: &str) -> String {
    if self.seq == 0 {
      format!("{}-{}", self.seconds, name)
    } else {
      format!("{}.{:03}-{}", self.seconds, self.seq, name)
    }
  }

  /// Recover stamp and trailing name from an object filename.
  ///
  /// Returns `None` for names that do not carry a stamp prefix; such objects
  /// sort before every stamped one when picking "latest".
  pub fn parse(filename: &str) -> Option<(VersionStamp, &str)> {
    let (stamp_part, name) = filename.split_once('-')?;
    match stamp_part.split_once('.') {
      Some((secs, seq)) => {
        let seconds = secs.parse().ok()?;
        let seq = seq.parse().ok()?;
        Some((VersionStamp { seconds, seq }, name))
      }
      None => {
        let seconds = stamp_part.parse().ok()?;
        Some((VersionStamp { seconds, seq: 0 }, name))
      }
    }
  }
}

impl std::fmt::Display for VersionStamp {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.seq == 0 {
      write!(f, "{}", self.seconds)
    } else {
      write!(f, "{}.{:03}", self.seconds, self.seq)
    }
  }
}

/// One immutable write under a logical key's remote folder.
///
/// Never mutated or overwritten in place; deletion is the only permitted
/// destructive operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedObject {
  /// Full remote path, `"{owner}/{key}/{stamp}-{filename}"`.
  pub path: String,
  pub stamp: VersionStamp,
  pub content_type: String,
  pub size_bytes: u64,
}

/// The remote object path the local cache last confirmed as current for one
/// `(owner, key)`. Only ever assigned from a real write or list response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMarker(String);

impl VersionMarker {
  pub fn new(path: impl Into<String>) -> Self {
    Self(path.into())
  }

  pub fn path(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for VersionMarker {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}
