//! Ed25519 node identity.
//!
//! The secret key is kept on disk as base64 of its 32 raw bytes. The peer id
//! announced to the coordinator is the base58btc encoding of the public key.

use crate::{Error, Result};
use base64::Engine;
use ed25519_dalek::SigningKey;
use std::fmt;
use std::path::Path;

pub struct NodeIdentity {
    key: SigningKey,
}

impl NodeIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            key: SigningKey::generate(&mut rng),
        }
    }

    /// Parse the on-disk encoding.
    pub fn from_encoded(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s.trim())
            .map_err(|e| Error::InvalidIdentity(format!("invalid base64: {e}")))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::InvalidIdentity(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    pub fn to_encoded(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key.as_bytes())
    }

    /// Read the key at `path`, creating it on first start.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            return Self::from_encoded(&contents);
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let identity = Self::generate();
        std::fs::write(path, identity.to_encoded())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(identity)
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    pub fn peer_id(&self) -> String {
        bs58::encode(self.public_key_bytes()).into_string()
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeIdentity({})", self.peer_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_roundtrip() {
        let identity = NodeIdentity::generate();
        let parsed = NodeIdentity::from_encoded(&identity.to_encoded()).unwrap();
        assert_eq!(identity.peer_id(), parsed.peer_id());
    }

    #[test]
    fn test_load_or_generate_persists_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("peer.key");

        let first = NodeIdentity::load_or_generate(&path).unwrap();
        assert!(path.exists());
        let second = NodeIdentity::load_or_generate(&path).unwrap();
        assert_eq!(first.peer_id(), second.peer_id());
    }

    #[test]
    fn test_rejects_truncated_key() {
        assert!(NodeIdentity::from_encoded("AAAA").is_err());
        assert!(NodeIdentity::from_encoded("not base64!").is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let identity = NodeIdentity::generate();
        let debug = format!("{identity:?}");
        assert!(!debug.contains(&identity.to_encoded()));
    }
}
