//! Public key directory.
//!
//! The server needs every user's public keys to open their envelopes, and
//! every client needs the server's to seal requests. How those keys were
//! distributed in the first place is out of scope: a [`KeyDirectory`] just
//! answers lookups.
//!
//! On disk, an identity `alice` is represented by two files in two
//! directories:
//!
//! - `<public>/alice.pub.json` - `{"signing": "<hex>", "encryption": "<hex>"}`,
//!   shared with every party
//! - `<secret>/alice.key` - the hex-encoded 32-byte seed, owner-only (0600 on
//!   unix) and never placed in the shared directory

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use lockbox_core::{Ed25519PublicKey, Identity, SEED_SIZE};

use crate::crypto::{IdentityKeys, PublicKeys, X25519PublicKey};
use crate::error::{PermsError, Result};

/// Looks up and publishes public keys by identity.
pub trait KeyDirectory: Send + Sync {
    /// Public keys on file for `identity`, if any.
    fn public_keys(&self, identity: &Identity) -> Result<Option<PublicKeys>>;

    /// Record the public keys for `identity`, replacing any previous entry.
    fn publish(&self, identity: &Identity, keys: &PublicKeys) -> Result<()>;

    /// Like [`public_keys`](Self::public_keys), but a missing entry is an error.
    fn require(&self, identity: &Identity) -> Result<PublicKeys> {
        self.public_keys(identity)?
            .ok_or_else(|| PermsError::UnknownKey(identity.clone()))
    }
}

/// In-memory key directory for tests.
#[derive(Debug, Default)]
pub struct MemoryKeyDirectory {
    keys: RwLock<HashMap<Identity, PublicKeys>>,
}

impl MemoryKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities on file.
    pub fn len(&self) -> usize {
        self.keys.read().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyDirectory for MemoryKeyDirectory {
    fn public_keys(&self, identity: &Identity) -> Result<Option<PublicKeys>> {
        let keys = self
            .keys
            .read()
            .map_err(|_| PermsError::InvalidKey("key directory lock poisoned".into()))?;
        Ok(keys.get(identity).copied())
    }

    fn publish(&self, identity: &Identity, public: &PublicKeys) -> Result<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| PermsError::InvalidKey("key directory lock poisoned".into()))?;
        keys.insert(identity.clone(), *public);
        Ok(())
    }
}

/// On-disk layout of a public key file.
#[derive(Debug, Serialize, Deserialize)]
struct PublicKeyFile {
    signing: String,
    encryption: String,
}

impl From<&PublicKeys> for PublicKeyFile {
    fn from(keys: &PublicKeys) -> Self {
        Self {
            signing: keys.signing.to_hex(),
            encryption: keys.encryption.to_hex(),
        }
    }
}

impl TryFrom<PublicKeyFile> for PublicKeys {
    type Error = PermsError;

    fn try_from(file: PublicKeyFile) -> Result<Self> {
        let signing = Ed25519PublicKey::from_hex(&file.signing)
            .map_err(|e| PermsError::InvalidKey(format!("signing key: {e}")))?;
        let encryption = X25519PublicKey::from_hex(&file.encryption)
            .map_err(|e| PermsError::InvalidKey(format!("encryption key: {e}")))?;
        Ok(PublicKeys {
            signing,
            encryption,
        })
    }
}

/// Key directory backed by a directory of `<identity>.pub.json` files.
#[derive(Debug, Clone)]
pub struct FsKeyDirectory {
    root: PathBuf,
}

impl FsKeyDirectory {
    /// Use `root` as the key directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory holding the key files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn public_path(&self, identity: &Identity) -> PathBuf {
        self.root.join(format!("{identity}.pub.json"))
    }
}

impl KeyDirectory for FsKeyDirectory {
    fn public_keys(&self, identity: &Identity) -> Result<Option<PublicKeys>> {
        let contents = match fs::read_to_string(self.public_path(identity)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: PublicKeyFile = serde_json::from_str(&contents)
            .map_err(|e| PermsError::Serialization(e.to_string()))?;
        Ok(Some(file.try_into()?))
    }

    fn publish(&self, identity: &Identity, keys: &PublicKeys) -> Result<()> {
        let json = serde_json::to_string_pretty(&PublicKeyFile::from(keys))
            .map_err(|e| PermsError::Serialization(e.to_string()))?;
        fs::write(self.public_path(identity), json)?;
        Ok(())
    }
}

/// Load the keys of `identity`, generating them on first use.
///
/// The secret seed lives in `secret_dir/<identity>.key`. The public half is
/// published to the shared `public_dir`. The two directories must differ.
pub fn load_or_generate_keypair(
    secret_dir: &Path,
    public_dir: &Path,
    identity: &Identity,
) -> Result<IdentityKeys> {
    let directory = FsKeyDirectory::open(public_dir)?;
    fs::create_dir_all(secret_dir)?;
    if fs::canonicalize(secret_dir)? == fs::canonicalize(public_dir)? {
        return Err(PermsError::InvalidKey(format!(
            "secret keys must not live in the shared key directory {}",
            public_dir.display()
        )));
    }
    let secret_path = secret_dir.join(format!("{identity}.key"));

    match fs::read_to_string(&secret_path) {
        Ok(contents) => {
            warn_if_exposed(&secret_path)?;
            let keys = IdentityKeys::from_seed(&parse_seed(contents.trim())?);
            if directory.public_keys(identity)?.is_none() {
                directory.publish(identity, &keys.public_keys())?;
            }
            Ok(keys)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let keys = IdentityKeys::generate();
            write_secret(&secret_path, hex::encode(keys.seed()).as_bytes())?;
            directory.publish(identity, &keys.public_keys())?;
            tracing::info!(%identity, path = %secret_path.display(), "generated new keypair");
            Ok(keys)
        }
        Err(e) => Err(e.into()),
    }
}

/// Create `path` readable by its owner only.
fn write_secret(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

fn warn_if_exposed(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path)?.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(path = %path.display(), mode = format!("{:o}", mode & 0o777), "secret key is readable by others");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn parse_seed(hex_seed: &str) -> Result<[u8; SEED_SIZE]> {
    let bytes = hex::decode(hex_seed).map_err(|e| PermsError::InvalidKey(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| PermsError::InvalidKey(format!("seed must be {SEED_SIZE} bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[test]
    fn test_memory_directory() {
        let directory = MemoryKeyDirectory::new();
        let keys = IdentityKeys::generate().public_keys();

        assert!(directory.public_keys(&id("alice")).unwrap().is_none());
        assert!(matches!(
            directory.require(&id("alice")),
            Err(PermsError::UnknownKey(_))
        ));

        directory.publish(&id("alice"), &keys).unwrap();
        assert_eq!(directory.require(&id("alice")).unwrap(), keys);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_fs_directory_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let directory = FsKeyDirectory::open(tmp.path()).unwrap();
        let keys = IdentityKeys::generate().public_keys();

        assert!(directory.public_keys(&id("bob")).unwrap().is_none());
        directory.publish(&id("bob"), &keys).unwrap();

        assert!(tmp.path().join("bob.pub.json").exists());
        assert_eq!(directory.public_keys(&id("bob")).unwrap(), Some(keys));
    }

    #[test]
    fn test_fs_directory_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let directory = FsKeyDirectory::open(tmp.path()).unwrap();

        fs::write(tmp.path().join("eve.pub.json"), "not json").unwrap();
        assert!(matches!(
            directory.public_keys(&id("eve")),
            Err(PermsError::Serialization(_))
        ));

        fs::write(
            tmp.path().join("eve.pub.json"),
            r#"{"signing": "abcd", "encryption": "abcd"}"#,
        )
        .unwrap();
        assert!(matches!(
            directory.public_keys(&id("eve")),
            Err(PermsError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_load_or_generate_is_stable() {
        let tmp = TempDir::new().unwrap();
        let (secret, public) = (tmp.path().join("secret"), tmp.path().join("public"));

        let first = load_or_generate_keypair(&secret, &public, &id("server")).unwrap();
        let second = load_or_generate_keypair(&secret, &public, &id("server")).unwrap();
        assert_eq!(first.public_keys(), second.public_keys());

        let published = FsKeyDirectory::open(&public)
            .unwrap()
            .require(&id("server"))
            .unwrap();
        assert_eq!(published, first.public_keys());
    }

    #[test]
    fn test_seed_stays_out_of_the_shared_directory() {
        let tmp = TempDir::new().unwrap();
        let (secret, public) = (tmp.path().join("secret"), tmp.path().join("public"));
        load_or_generate_keypair(&secret, &public, &id("server")).unwrap();

        let shared: Vec<_> = fs::read_dir(&public)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(shared, ["server.pub.json"]);
        assert!(secret.join("server.key").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(secret.join("server.key"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_shared_directory_cannot_hold_secrets() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_or_generate_keypair(tmp.path(), tmp.path(), &id("server")),
            Err(PermsError::InvalidKey(_))
        ));
        assert!(!tmp.path().join("server.key").exists());
    }

    #[test]
    fn test_load_rejects_short_seed() {
        let tmp = TempDir::new().unwrap();
        let (secret, public) = (tmp.path().join("secret"), tmp.path().join("public"));
        fs::create_dir_all(&secret).unwrap();
        fs::write(secret.join("carol.key"), "00ff").unwrap();

        assert!(matches!(
            load_or_generate_keypair(&secret, &public, &id("carol")),
            Err(PermsError::InvalidKey(_))
        ));
    }
}
