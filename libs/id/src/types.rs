//! Object keys and generated identifiers.
//!
//! Fleet objects are addressed the way the orchestration API addresses them:
//! by `namespace/name`. Generated identifiers are ULID-based so that names
//! the controller mints are unique and sort by creation time.

use std::fmt;
use std::str::FromStr;

use crate::{define_id, IdError};

// =============================================================================
// Generated identifiers
// =============================================================================

define_id!(PassId, "pass");
define_id!(MigrationName, "workload-update");

// =============================================================================
// Object keys
// =============================================================================

/// Namespaced identity of an orchestrated object.
///
/// Ordering is `(namespace, name)`, which is the stable enumeration order used
/// when picking rollout candidates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    namespace: String,
    name: String,
}

impl ObjectKey {
    /// Creates a key from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a key for a sibling object in the same namespace.
    #[must_use]
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.namespace.clone(), name)
    }

    /// Parses a key in `namespace/name` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((namespace, name)) = s.split_once('/') else {
            return Err(IdError::InvalidKey {
                key: s.to_string(),
                message: "expected namespace/name",
            });
        };

        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(IdError::InvalidKey {
                key: s.to_string(),
                message: "namespace and name must be non-empty single segments",
            });
        }

        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for ObjectKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ObjectKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
