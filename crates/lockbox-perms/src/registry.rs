//! The access registry.
//!
//! In-memory authoritative state: which users exist, who owns each file and
//! who may read it. All mutation happens through the `record_*` methods, which
//! assume the request was already validated; predicates never mutate.

use std::collections::{BTreeMap, BTreeSet};

use lockbox_core::{FileRecord, Filename, Identity, RegistrySnapshot};

/// Users and per-file access state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRegistry {
    /// Registered users.
    users: BTreeSet<Identity>,

    /// File records indexed by filename.
    files: BTreeMap<Filename, FileRecord>,
}

impl AccessRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted snapshot.
    ///
    /// Owners are re-added to their access lists if a damaged snapshot
    /// dropped them.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let users = snapshot.users.into_iter().collect();
        let files = snapshot
            .files
            .into_iter()
            .map(|mut record| {
                if !record.can_read(&record.owner) {
                    record.access.insert(0, record.owner.clone());
                }
                (record.filename.clone(), record)
            })
            .collect();

        Self { users, files }
    }

    /// Copy out the current state for persistence.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            users: self.users.iter().cloned().collect(),
            files: self.files.values().cloned().collect(),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Register a user.
    pub fn add_user(&mut self, user: Identity) {
        self.users.insert(user);
    }

    /// Record a new file owned (and readable) by `owner`.
    pub fn record_upload(&mut self, owner: Identity, filename: Filename) {
        let record = FileRecord::new(filename.clone(), owner);
        self.files.insert(filename, record);
    }

    /// Grant `grantee` read access. No-op if they already have it.
    pub fn record_share(&mut self, filename: &Filename, grantee: Identity) {
        if let Some(record) = self.files.get_mut(filename) {
            record.grant(grantee);
        }
    }

    /// Forget a file.
    pub fn record_delete(&mut self, filename: &Filename) -> Option<FileRecord> {
        self.files.remove(filename)
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    pub fn is_user(&self, user: &Identity) -> bool {
        self.users.contains(user)
    }

    pub fn has_file(&self, filename: &Filename) -> bool {
        self.files.contains_key(filename)
    }

    /// Whether `user` owns `filename`. False for unknown files.
    pub fn is_owner(&self, user: &Identity, filename: &Filename) -> bool {
        self.files
            .get(filename)
            .is_some_and(|record| record.is_owner(user))
    }

    /// Whether `user` may read `filename`. False for unknown files.
    pub fn is_authorized_read(&self, user: &Identity, filename: &Filename) -> bool {
        self.files
            .get(filename)
            .is_some_and(|record| record.can_read(user))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The record for `filename`.
    pub fn file(&self, filename: &Filename) -> Option<&FileRecord> {
        self.files.get(filename)
    }

    /// Files owned by `user`, in filename order.
    pub fn files_owned_by(&self, user: &Identity) -> Vec<&Filename> {
        self.files
            .values()
            .filter(|record| record.is_owner(user))
            .map(|record| &record.filename)
            .collect()
    }

    /// Files `user` may read, in filename order.
    pub fn files_readable_by(&self, user: &Identity) -> Vec<&Filename> {
        self.files
            .values()
            .filter(|record| record.can_read(user))
            .map(|record| &record.filename)
            .collect()
    }

    /// All registered users.
    pub fn users(&self) -> impl Iterator<Item = &Identity> {
        self.users.iter()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    fn registry_with_notes() -> AccessRegistry {
        let mut registry = AccessRegistry::new();
        registry.add_user(id("alice"));
        registry.add_user(id("bob"));
        registry.record_upload(id("alice"), Filename::new("notes.txt"));
        registry
    }

    #[test]
    fn test_add_user() {
        let mut registry = AccessRegistry::new();
        assert!(!registry.is_user(&id("alice")));

        registry.add_user(id("alice"));
        registry.add_user(id("alice"));

        assert!(registry.is_user(&id("alice")));
        assert_eq!(registry.user_count(), 1);
    }

    #[test]
    fn test_upload_grants_owner_read() {
        let registry = registry_with_notes();
        let notes = Filename::new("notes.txt");

        assert!(registry.has_file(&notes));
        assert!(registry.is_owner(&id("alice"), &notes));
        assert!(registry.is_authorized_read(&id("alice"), &notes));
        assert!(!registry.is_owner(&id("bob"), &notes));
        assert!(!registry.is_authorized_read(&id("bob"), &notes));
    }

    #[test]
    fn test_share_is_monotonic() {
        let mut registry = registry_with_notes();
        let notes = Filename::new("notes.txt");

        registry.record_share(&notes, id("bob"));
        registry.record_share(&notes, id("bob"));

        assert!(registry.is_authorized_read(&id("bob"), &notes));
        assert!(!registry.is_owner(&id("bob"), &notes));
        assert_eq!(
            registry.file(&notes).unwrap().access,
            vec![id("alice"), id("bob")]
        );
    }

    #[test]
    fn test_delete_removes_all_access() {
        let mut registry = registry_with_notes();
        let notes = Filename::new("notes.txt");
        registry.record_share(&notes, id("bob"));

        let removed = registry.record_delete(&notes).unwrap();
        assert_eq!(removed.owner, id("alice"));

        assert!(!registry.has_file(&notes));
        assert!(!registry.is_owner(&id("alice"), &notes));
        assert!(!registry.is_authorized_read(&id("bob"), &notes));
        assert!(registry.record_delete(&notes).is_none());
    }

    #[test]
    fn test_queries_by_user() {
        let mut registry = registry_with_notes();
        registry.record_upload(id("bob"), Filename::new("b.txt"));
        registry.record_share(&Filename::new("b.txt"), id("alice"));

        assert_eq!(
            registry.files_owned_by(&id("alice")),
            vec![&Filename::new("notes.txt")]
        );
        assert_eq!(
            registry.files_readable_by(&id("alice")),
            vec![&Filename::new("b.txt"), &Filename::new("notes.txt")]
        );
        assert!(registry.files_owned_by(&id("carol")).is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut registry = registry_with_notes();
        registry.record_share(&Filename::new("notes.txt"), id("bob"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.users.len(), 2);
        assert_eq!(snapshot.files.len(), 1);

        assert_eq!(AccessRegistry::from_snapshot(snapshot), registry);
    }

    #[test]
    fn test_from_snapshot_restores_owner_access() {
        let snapshot = RegistrySnapshot {
            users: vec![id("alice")],
            files: vec![FileRecord {
                filename: Filename::new("x"),
                owner: id("alice"),
                access: vec![],
            }],
        };

        let registry = AccessRegistry::from_snapshot(snapshot);
        assert!(registry.is_authorized_read(&id("alice"), &Filename::new("x")));
    }
}
