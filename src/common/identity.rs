//! Identity resolution
//!
//! Every process of the same logical application must agree on a single
//! short string that names both the leadership lock and the socket. The
//! identity is a SHA-256 over the (organization, application, version)
//! triple, so distinct applications get distinct names without any
//! central registry, and upgrading the version cleanly isolates old and
//! new copies from each other.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Hex characters kept from the digest. 32 chars keeps the socket path
/// well under the 108-byte `sun_path` limit while leaving collisions
/// practically impossible.
const IDENTITY_LEN: usize = 32;

/// Stable identity string scoping the election and the transport name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Derive the canonical identity for an application.
    ///
    /// Deterministic and stable across runs: identical inputs always
    /// produce the same identity. Components are filtered down to ASCII
    /// alphanumerics before hashing so cosmetic differences (spacing,
    /// punctuation) do not split an application into two identities.
    pub fn resolve(organization: &str, application: &str, version: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(filter_component(organization));
        hasher.update(filter_component(application));
        hasher.update(filter_component(version));
        let digest = hasher.finalize();
        let mut name = hex::encode(digest);
        name.truncate(IDENTITY_LEN);
        Identity(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the socket the leader listens on.
    pub fn socket_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("instance-bus-{}.sock", self.0))
    }

    /// Path of the lock file backing the leadership token.
    pub fn lock_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("instance-bus-{}.lock", self.0))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn filter_component(s: &str) -> Vec<u8> {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_deterministic() {
        let a = Identity::resolve("acme", "editor", "2.1.0");
        let b = Identity::resolve("acme", "editor", "2.1.0");
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_distinct_triples() {
        let a = Identity::resolve("acme", "editor", "2.1.0");
        let b = Identity::resolve("acme", "editor", "2.2.0");
        let c = Identity::resolve("acme", "player", "2.1.0");
        let d = Identity::resolve("globex", "editor", "2.1.0");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(b, c);
    }

    #[test]
    fn test_resolve_filters_punctuation() {
        // Cosmetic punctuation differences must not fork the identity.
        let a = Identity::resolve("Acme Corp.", "My App", "1.0");
        let b = Identity::resolve("AcmeCorp", "MyApp", "1.0");
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_shape() {
        let id = Identity::resolve("acme", "editor", "1.0");
        assert_eq!(id.as_str().len(), IDENTITY_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_paths_are_scoped() {
        let a = Identity::resolve("acme", "editor", "1.0");
        let b = Identity::resolve("acme", "editor", "2.0");
        assert_ne!(a.socket_path(), b.socket_path());
        assert_ne!(a.lock_path(), b.lock_path());
        assert_ne!(a.socket_path(), a.lock_path());
    }
}
