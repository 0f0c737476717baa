//! Strong type definitions for Lockbox.
//!
//! User names and file names are newtypes so they cannot be swapped by
//! accident when threaded through the validator and executor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Identity the server signs and seals its responses as.
pub const SERVER_IDENTITY: &str = "server";

/// Maximum identity length in bytes.
pub const MAX_IDENTITY_LEN: usize = 64;

/// A user identity.
///
/// Identities also name key files in the PKI directory, so they are limited
/// to ASCII alphanumerics plus `-`, `_` and `.`, and may not start with `.`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Create a validated identity.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::InvalidIdentity(name, "empty"));
        }
        if name.len() > MAX_IDENTITY_LEN {
            return Err(CoreError::InvalidIdentity(name, "longer than 64 bytes"));
        }
        if name.starts_with('.') {
            return Err(CoreError::InvalidIdentity(name, "starts with '.'"));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        {
            return Err(CoreError::InvalidIdentity(name, "contains forbidden characters"));
        }
        Ok(Self(name))
    }

    /// The server's own identity.
    pub fn server() -> Self {
        Self(SERVER_IDENTITY.to_string())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

/// The name a file is stored under.
///
/// Not validated on construction: an empty or path-like name is a request
/// error reported by the validator, not a decoding error.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filename(String);

impl Filename {
    /// Wrap a file name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the name is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the name is a single plain path component.
    ///
    /// Rejects separators, NUL, `.` and `..`, so that joining the name onto
    /// a directory can never leave that directory.
    pub fn is_plain(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\', '\0'])
    }
}

impl fmt::Debug for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filename({:?})", self.0)
    }
}

impl fmt::Display for Filename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Filename {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Filename {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Ownership and read access for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// The file this record describes.
    pub filename: Filename,

    /// Who uploaded the file. Never changes.
    pub owner: Identity,

    /// Who may read the file, in grant order. The owner is always first.
    pub access: Vec<Identity>,
}

impl FileRecord {
    /// A fresh record readable only by its owner.
    pub fn new(filename: Filename, owner: Identity) -> Self {
        Self {
            filename,
            access: vec![owner.clone()],
            owner,
        }
    }

    /// Check if a user may read the file.
    pub fn can_read(&self, user: &Identity) -> bool {
        self.access.contains(user)
    }

    /// Check if a user owns the file.
    pub fn is_owner(&self, user: &Identity) -> bool {
        &self.owner == user
    }

    /// Add a reader. Returns false if they already had access.
    pub fn grant(&mut self, user: Identity) -> bool {
        if self.can_read(&user) {
            return false;
        }
        self.access.push(user);
        true
    }
}

/// A point-in-time copy of the access registry, as handed to persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// All registered users.
    pub users: Vec<Identity>,

    /// All file records.
    pub files: Vec<FileRecord>,
}

impl RegistrySnapshot {
    /// Whether the snapshot holds no users and no files.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.files.is_empty()
    }
}
