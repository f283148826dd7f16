//! Caller identity as seen by the registry
//!
//! The transport layer authenticates callers and hands the registry a
//! [`Principal`]; the registry only looks at the id and the two role flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the party requesting registry access
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    id: String,
    user: bool,
    administrator: bool,
}

impl Principal {
    /// Create a principal with explicit role flags
    pub fn new(id: impl Into<String>, user: bool, administrator: bool) -> Self {
        Self {
            id: id.into(),
            user,
            administrator,
        }
    }

    /// An ordinary editing user
    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, true, false)
    }

    /// An administrator
    pub fn administrator(id: impl Into<String>) -> Self {
        Self::new(id, true, true)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_user(&self) -> bool {
        self.user
    }

    pub fn is_administrator(&self) -> bool {
        self.administrator
    }

    /// Principals without the user role, and administrators, work against master
    pub fn uses_master(&self) -> bool {
        !self.user || self.administrator
    }

    /// Stable directory name for this principal's private repository
    ///
    /// Ids made only of `[A-Za-z0-9._-]` are used as-is; anything else is hex
    /// encoded behind a `~` prefix, which cannot appear in a plain key.
    pub fn repository_key(&self) -> Option<String> {
        if self.id.is_empty() || self.id == "." || self.id == ".." {
            return None;
        }

        let plain = self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        if plain {
            Some(self.id.clone())
        } else {
            Some(format!("~{}", hex::encode(self.id.as_bytes())))
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.administrator {
            "admin"
        } else if self.user {
            "user"
        } else {
            "guest"
        };
        write!(f, "{} ({})", self.id, role)
    }
}

/// Opaque identifier of a transport session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_routing() {
        assert!(Principal::administrator("casadmin").uses_master());
        assert!(!Principal::user("alice").uses_master());
        // no user role at all still lands on master
        assert!(Principal::new("service-account", false, false).uses_master());
    }

    #[test]
    fn test_repository_key_plain_ids() {
        assert_eq!(
            Principal::user("alice.smith-2").repository_key().as_deref(),
            Some("alice.smith-2")
        );
    }

    #[test]
    fn test_repository_key_encodes_unsafe_ids() {
        let key = Principal::user("bob@example.org").repository_key().unwrap();
        assert_eq!(key, format!("~{}", hex::encode("bob@example.org")));
        assert!(!key.contains('/'));

        let traversal = Principal::user("../master").repository_key().unwrap();
        assert!(traversal.starts_with('~'));
    }

    #[test]
    fn test_repository_key_rejects_degenerate_ids() {
        assert!(Principal::user("").repository_key().is_none());
        assert!(Principal::user("..").repository_key().is_none());
    }

    #[test]
    fn test_distinct_principals_distinct_keys() {
        let a = Principal::user("a b").repository_key().unwrap();
        let b = Principal::user("a_b").repository_key().unwrap();
        assert_ne!(a, b);
    }
}
