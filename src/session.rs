//! Owner/session collaborator.
//!
//! The sync layer never reads an ambient "current user": every public
//! operation takes an explicit [`OwnerId`](crate::key::OwnerId). The session
//! provider only answers whether remote operations may run for that owner.
//! "No session" means local-cache-only, never an error.

use crate::key::OwnerId;

/// Supplied by the host application's auth layer.
pub trait SessionProvider: Send + Sync {
  /// Whether `owner` currently holds an authenticated session. When false,
  /// all remote calls for that owner are skipped.
  fn is_authenticated(&self, owner: &OwnerId) -> bool;
}

/// A fixed session answer. Useful for wiring and tests: `authenticated()`
/// for a signed-in device, `anonymous()` for local-only operation.
pub struct StaticSession {
  authenticated: bool,
}

impl StaticSession {
  pub fn authenticated() -> Self {
    Self {
      authenticated: true,
    }
  }

  pub fn anonymous() -> Self {
    Self {
      authenticated: false,
    }
  }
}

impl SessionProvider for StaticSession {
  fn is_authenticated(&self, _owner: &OwnerId) -> bool {
    self.authenticated
  }
}
