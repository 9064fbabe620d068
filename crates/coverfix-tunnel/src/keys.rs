//! Private key loading over an ordered algorithm registry
//!
//! Mixed key fleets still advertise legacy algorithms; the registry walks
//! its entries in order and skips any entry that reports itself incapable
//! of signing instead of failing the enumeration. `LegacyDsa` exists only
//! as that incapable stand-in and can never authenticate a session.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use russh::keys::ssh_key::Algorithm;
use russh::keys::{load_secret_key, PrivateKey};
use serde::{Deserialize, Serialize};

/// A key algorithm the registry knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// Primary algorithm: ssh-ed25519
    Ed25519,
    /// Fallback algorithm: ssh-rsa, any RSA signature hash
    Rsa,
    /// Legacy ssh-dss stand-in; enumerable, never signs
    LegacyDsa,
}

impl KeyAlgorithm {
    /// Wire name of the algorithm
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "ssh-ed25519",
            Self::Rsa => "ssh-rsa",
            Self::LegacyDsa => "ssh-dss",
        }
    }

    /// Whether this registry entry can produce signatures
    #[must_use]
    pub const fn can_sign(self) -> bool {
        !matches!(self, Self::LegacyDsa)
    }

    /// Whether a decoded private key carries this algorithm
    #[must_use]
    pub fn matches(self, algorithm: &Algorithm) -> bool {
        match self {
            Self::Ed25519 => matches!(algorithm, Algorithm::Ed25519),
            Self::Rsa => matches!(algorithm, Algorithm::Rsa { .. }),
            Self::LegacyDsa => matches!(algorithm, Algorithm::Dsa),
        }
    }
}

impl Display for KeyAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered list of key algorithms to attempt when loading an identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyAlgorithmRegistry {
    entries: Vec<KeyAlgorithm>,
}

impl KeyAlgorithmRegistry {
    /// Build a registry from an explicit ordering
    #[must_use]
    pub fn new(entries: Vec<KeyAlgorithm>) -> Self {
        Self { entries }
    }

    /// Registered algorithms, in attempt order
    pub fn iter(&self) -> impl Iterator<Item = KeyAlgorithm> + '_ {
        self.entries.iter().copied()
    }

    /// Human-readable attempt order
    #[must_use]
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for KeyAlgorithmRegistry {
    /// Ed25519 primary, RSA fallback, legacy DSA stand-in last
    fn default() -> Self {
        Self::new(vec![
            KeyAlgorithm::Ed25519,
            KeyAlgorithm::Rsa,
            KeyAlgorithm::LegacyDsa,
        ])
    }
}

/// No usable credential could be produced from the key file
#[derive(Debug, thiserror::Error)]
pub enum KeyLoadError {
    /// File unreadable, or not a private key in any known encoding
    #[error("cannot read private key {path}: {source}")]
    Unreadable {
        /// Expanded key file path
        path: PathBuf,
        /// Decoder failure
        #[source]
        source: russh::keys::Error,
    },

    /// The key decoded, but no sign-capable registry entry matches it
    #[error("no usable key algorithm for {algorithm} key (registry: {registry})")]
    NoUsableAlgorithm {
        /// Algorithm carried by the decoded key
        algorithm: String,
        /// Registry attempt order
        registry: String,
    },
}

/// Expand a leading `~` against the user's home directory
#[must_use]
pub fn expand_user_path(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// Load the private key at `path`, honoring registry order
///
/// The file is decoded once; the registry is then walked in order and the
/// first sign-capable entry matching the decoded key wins. Sign-incapable
/// entries are enumerated and skipped, never treated as failures.
///
/// # Errors
/// [`KeyLoadError::Unreadable`] when the file cannot be decoded at all,
/// [`KeyLoadError::NoUsableAlgorithm`] when nothing in the registry can
/// sign with the decoded key.
pub fn load_identity(
    path: &Path,
    registry: &KeyAlgorithmRegistry,
) -> Result<PrivateKey, KeyLoadError> {
    let expanded = expand_user_path(path);
    tracing::debug!(path = %expanded.display(), "loading private key");

    let key = load_secret_key(&expanded, None).map_err(|source| KeyLoadError::Unreadable {
        path: expanded.clone(),
        source,
    })?;

    for entry in registry.iter() {
        if !entry.can_sign() {
            tracing::debug!(algorithm = entry.name(), "skipping sign-incapable registry entry");
            continue;
        }
        if entry.matches(&key.algorithm()) {
            tracing::debug!(algorithm = entry.name(), "private key accepted");
            return Ok(key);
        }
    }

    Err(KeyLoadError::NoUsableAlgorithm {
        algorithm: key.algorithm().to_string(),
        registry: registry.describe(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use russh::keys::ssh_key::{LineEnding, PrivateKey};
    use std::io::Write;

    fn ed25519_key_file() -> tempfile::NamedTempFile {
        let key = PrivateKey::random(&mut rand_core::OsRng, Algorithm::Ed25519).unwrap();
        let encoded = key.to_openssh(LineEnding::LF).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(encoded.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn legacy_dsa_is_enumerable_but_cannot_sign() {
        assert!(KeyAlgorithm::Ed25519.can_sign());
        assert!(KeyAlgorithm::Rsa.can_sign());
        assert!(!KeyAlgorithm::LegacyDsa.can_sign());
        assert_eq!(KeyAlgorithm::LegacyDsa.name(), "ssh-dss");
    }

    #[test]
    fn default_registry_order() {
        let registry = KeyAlgorithmRegistry::default();
        let order: Vec<_> = registry.iter().collect();
        assert_eq!(
            order,
            vec![
                KeyAlgorithm::Ed25519,
                KeyAlgorithm::Rsa,
                KeyAlgorithm::LegacyDsa
            ]
        );
        assert_eq!(registry.describe(), "ssh-ed25519, ssh-rsa, ssh-dss");
    }

    #[test]
    fn loads_ed25519_identity() {
        let file = ed25519_key_file();
        let key = load_identity(file.path(), &KeyAlgorithmRegistry::default()).unwrap();
        assert!(matches!(key.algorithm(), Algorithm::Ed25519));
    }

    #[test]
    fn rejects_undecodable_key_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not a private key").unwrap();
        file.flush().unwrap();

        let err = load_identity(file.path(), &KeyAlgorithmRegistry::default()).unwrap_err();
        assert!(matches!(err, KeyLoadError::Unreadable { .. }));
    }

    #[test]
    fn rejects_missing_key_file() {
        let err = load_identity(
            Path::new("/nonexistent/id_ed25519"),
            &KeyAlgorithmRegistry::default(),
        )
        .unwrap_err();
        assert!(matches!(err, KeyLoadError::Unreadable { .. }));
    }

    #[test]
    fn incapable_only_registry_yields_no_usable_algorithm() {
        let file = ed25519_key_file();
        let registry = KeyAlgorithmRegistry::new(vec![KeyAlgorithm::LegacyDsa]);

        let err = load_identity(file.path(), &registry).unwrap_err();
        assert!(matches!(err, KeyLoadError::NoUsableAlgorithm { .. }));
    }

    #[test]
    fn expand_user_path_substitutes_home() {
        let expanded = expand_user_path(Path::new("~/.ssh/id_ed25519"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with(".ssh/id_ed25519"));
    }

    #[test]
    fn expand_user_path_keeps_absolute_paths() {
        let path = Path::new("/etc/keys/id_rsa");
        assert_eq!(expand_user_path(path), PathBuf::from("/etc/keys/id_rsa"));
    }
}
