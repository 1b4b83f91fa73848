//! Anchor identifier.

use serde::{Deserialize, Serialize};

/// Stable identifier of an anchor, shared with the window that owns it.
///
/// Ordered so that published snapshots iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnchorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AnchorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
