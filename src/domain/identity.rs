//! Caller identity used for per-client admission control.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Opaque token identifying a caller.
///
/// The boundary layer decides what an identity is (API key, peer address,
/// session id). The gateway only hashes and compares identities, so the value
/// is stored behind an `Arc<str>` and clones are cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ClientIdentity(Arc<str>);

impl ClientIdentity {
    /// Create an identity from any string-like value.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ClientIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientIdentity {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<ClientIdentity> for String {
    fn from(value: ClientIdentity) -> Self {
        value.0.to_string()
    }
}
