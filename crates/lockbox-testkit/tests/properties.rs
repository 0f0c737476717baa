//! Property tests over random request scripts.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use lockbox::{ServerConfig, ServerState};
use lockbox_core::{Identity, RegistrySnapshot};
use lockbox_perms::{IdentityKeys, MemoryKeyDirectory};
use lockbox_store::MemoryStore;
use lockbox_testkit::generators::{file_data, filename, request_script};
use lockbox_testkit::TestServer;

const USERS: &[&str] = &["alice", "bob", "carol"];

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Structural invariants every reachable registry satisfies.
fn check_registry(snapshot: &RegistrySnapshot) -> Result<(), TestCaseError> {
    let users: BTreeSet<&Identity> = snapshot.users.iter().collect();
    prop_assert_eq!(users.len(), snapshot.users.len(), "duplicate user");

    let mut names = BTreeSet::new();
    for record in &snapshot.files {
        prop_assert!(names.insert(&record.filename), "duplicate file record");
        prop_assert!(record.filename.is_plain());
        prop_assert!(users.contains(&record.owner), "owner is not a user");
        prop_assert_eq!(record.access.first(), Some(&record.owner));

        let readers: BTreeSet<&Identity> = record.access.iter().collect();
        prop_assert_eq!(readers.len(), record.access.len(), "duplicate reader");
        for reader in &record.access {
            prop_assert!(users.contains(reader), "reader is not a user");
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_scripts_keep_the_registry_consistent(script in request_script(USERS, 40)) {
        let rt = runtime();
        let store = Arc::new(MemoryStore::new());

        let (snapshot, blobs) = rt.block_on(async {
            let state = ServerState::load(
                ServerConfig::default(),
                IdentityKeys::generate(),
                Arc::new(MemoryKeyDirectory::new()),
                store.clone(),
                store.clone(),
            )
            .await
            .unwrap();

            for (sender, request) in script {
                let before = state.snapshot().await;
                let response = state.handle_request(&sender, request).await;
                if !response.is_success() {
                    // Rejected requests leave no trace.
                    assert_eq!(state.snapshot().await, before);
                }
            }
            (state.snapshot().await, store.file_count())
        });

        check_registry(&snapshot)?;
        prop_assert_eq!(blobs, snapshot.files.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn uploaded_files_download_unchanged(name in filename(), data in file_data(4096)) {
        let rt = runtime();
        let downloaded = rt.block_on(async {
            let server = TestServer::start().await.unwrap();
            let alice = server.client("alice");
            alice.add_user().await.unwrap();

            let upload = alice.upload_file(name.clone(), data.clone()).await.unwrap();
            assert!(upload.is_success(), "{:?}", upload.error());

            let response = alice.download_file(name.clone()).await.unwrap();
            server.stop().await.unwrap();
            response.into_file()
        });

        let (returned_name, returned_data) = downloaded.unwrap();
        prop_assert_eq!(returned_name, name);
        prop_assert_eq!(returned_data, data);
    }
}
