//! Pattern identifiers.

use serde::{Deserialize, Serialize};

/// Names a reference template the perception port knows how to match,
/// e.g. `combat/button_retreat`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(String);

impl PatternId {
    /// Creates a new pattern ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the template family, the part before the first `/`.
    pub fn family(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(family, _)| family)
    }
}

impl From<&str> for PatternId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PatternId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for PatternId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
